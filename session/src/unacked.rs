//! The unacked table: packets awaiting a server ack, keyed by packet id.
//!
//! Records are inserted *before* the frame is handed to the outbound queue
//! so an ack can never arrive ahead of its record. Removal is idempotent:
//! an ack for an unknown packet id (already timed out, or a duplicate ack)
//! is a no-op.

use std::sync::Mutex;

use rustc_hash::FxHashMap;
use wire::secmsg::SecPacket;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnackedRecord {
    /// When the packet was handed to the outbound queue (epoch millis).
    pub enqueued_at: i64,
    pub packet: SecPacket,
}

pub struct UnackedTable {
    records: Mutex<FxHashMap<String, UnackedRecord>>,
}

impl Default for UnackedTable {
    fn default() -> Self {
        Self::new()
    }
}

impl UnackedTable {
    pub fn new() -> UnackedTable {
        UnackedTable {
            records: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn insert(&self, enqueued_at: i64, packet: SecPacket) {
        let mut records = self.records.lock().expect("unacked table lock poisoned");
        records.insert(
            packet.packet_id.clone(),
            UnackedRecord { enqueued_at, packet },
        );
    }

    /// Removes and returns the record for `packet_id`; `None` if absent.
    pub fn remove(&self, packet_id: &str) -> Option<UnackedRecord> {
        let mut records = self.records.lock().expect("unacked table lock poisoned");
        records.remove(packet_id)
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("unacked table lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, packet_id: &str) -> bool {
        self.records
            .lock()
            .expect("unacked table lock poisoned")
            .contains_key(packet_id)
    }

    /// Removes and returns every record older than `max_age_millis` in one
    /// locked pass, so the scan sees a consistent snapshot.
    pub fn take_expired(&self, now: i64, max_age_millis: i64) -> Vec<UnackedRecord> {
        let mut records = self.records.lock().expect("unacked table lock poisoned");
        let expired_ids: Vec<String> = records
            .iter()
            .filter(|(_, record)| now - record.enqueued_at >= max_age_millis)
            .map(|(id, _)| id.clone())
            .collect();

        expired_ids
            .into_iter()
            .filter_map(|id| records.remove(&id))
            .collect()
    }
}
