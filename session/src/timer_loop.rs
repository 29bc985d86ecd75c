//! The timer loop: liveness enforcement. Every 200 ms it resets stalled
//! connections (response watchdog) and surfaces unacked packets older than
//! the ack timeout as send-timeouts.

use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::{info, warn};
use wire::secmsg::PacketKind;

use crate::clock::now_millis;
use crate::messages::{P2pMessage, P2tMessage};
use crate::session::SessionShared;

const TICK: Duration = Duration::from_millis(200);

pub(crate) async fn run_timer_loop(s: Arc<SessionShared>) {
    info!("starting timer loop");
    let mut ticks = time::interval(TICK);
    loop {
        ticks.tick().await;
        let now = now_millis();

        let deadline = s.conn.watchdog_deadline();
        if deadline > 0 && now > deadline {
            warn!("no response before the watchdog deadline, resetting socket");
            s.reset_connection().await;
        }

        scan_unacked(&s, now).await;
    }
}

/// One expiry pass over the unacked table. Expired records are removed in
/// a single locked sweep; the callbacks run afterwards, in sweep order.
async fn scan_unacked(s: &SessionShared, now: i64) {
    let Some(observer) = s.message_observer() else {
        if !s.unacked.is_empty() {
            warn!("unacked packets are expiring but no message observer is registered");
        }
        return;
    };

    for record in s.unacked.take_expired(now, s.config.ack_timeout) {
        match record.packet.kind {
            PacketKind::P2p => match P2pMessage::from_packet(&record.packet) {
                Ok(message) => observer.handle_send_message_timeout(message).await,
                Err(e) => warn!("dropping undecodable timed-out packet {}: {:#}", record.packet.packet_id, e),
            },
            PacketKind::P2t => match P2tMessage::from_packet(&record.packet) {
                Ok(message) => observer.handle_send_group_message_timeout(message).await,
                Err(e) => warn!("dropping undecodable timed-out packet {}: {:#}", record.packet.packet_id, e),
            },
            _ => {}
        }
    }
}
