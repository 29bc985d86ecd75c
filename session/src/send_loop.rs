//! The send loop: sole writer of the socket. Drives the connection through
//! handshake and bind, emits pings when idle, transmits queued frames and
//! resets the connection on write failure.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, info, trace, warn};
use wire::V6Frame;

use crate::clock::now_millis;
use crate::connection::ConnStatus;
use crate::frames;
use crate::outbound::SendMode;
use crate::session::{SessionShared, UserStatus};

const TICK: Duration = Duration::from_millis(100);

pub(crate) async fn run_send_loop(s: Arc<SessionShared>) {
    info!("starting send loop");
    loop {
        let mut mode = SendMode::DoubleDirection;
        let mut frame: Option<V6Frame> = None;

        match s.conn.status() {
            ConnStatus::NotConnected => {
                let now = now_millis();
                if now - s.last_create_conn_ts.load(Ordering::Acquire) <= s.config.connect_retry_interval {
                    sleep(TICK).await;
                    continue;
                }
                s.last_create_conn_ts.store(now, Ordering::Release);
                if let Err(e) = s.conn.connect().await {
                    warn!("connect failed: {:#}", e);
                    continue;
                }
                s.last_create_conn_ts.store(0, Ordering::Release);
                frame = Some(frames::build_conn_frame(&s));
            }
            ConnStatus::SockConnected => {
                // waiting for the CONN response
                sleep(TICK).await;
                continue;
            }
            ConnStatus::HandshakeConnected => {
                if s.user_status() == UserStatus::Offline {
                    let now = now_millis();
                    if now - s.last_login_ts.load(Ordering::Acquire) <= s.config.login_retry_interval {
                        sleep(TICK).await;
                        continue;
                    }
                    // None until a login produced a token
                    frame = frames::build_bind_frame(&s);
                    s.last_login_ts.store(now, Ordering::Release);
                }
            }
        }

        if s.user_status() == UserStatus::Online {
            match s.queue.try_pop() {
                Some(out) => {
                    mode = out.mode;
                    frame = Some(out.frame);
                }
                None => {
                    let now = now_millis();
                    if now - s.last_ping_ts.load(Ordering::Acquire) > s.config.ping_interval {
                        frame = Some(frames::build_ping_frame(&s));
                        mode = SendMode::SingleDirection;
                    }
                }
            }
        } else if s.try_login.load(Ordering::Acquire) {
            s.login().await;
            sleep(TICK).await;
        }

        let Some(frame) = frame else {
            sleep(TICK).await;
            continue;
        };

        if mode == SendMode::DoubleDirection {
            s.conn.try_arm_watchdog(now_millis());
        }

        let security_key = s.security_key();
        let body_key = s.conn.body_key();
        let bytes = frame.encode(body_key.as_ref(), &security_key);

        match s.conn.write_all(&bytes).await {
            Ok(()) => {
                s.last_ping_ts.store(now_millis(), Ordering::Release);
                trace!("sent frame {} ({:?})", frame.id, frame.cmd);
            }
            Err(e) => {
                error!("write failed: {:#}", e);
                s.reset_connection().await;
            }
        }
    }
}
