use std::collections::VecDeque;

use bytes::Bytes;
use tracing::debug;

/// `a <= b` on the wrapping sequence number circle.
pub(crate) fn seq_le(a: u32, b: u32) -> bool {
    b.wrapping_sub(a) < 1 << 31
}

/// Sent DATA payloads the peer has not confirmed yet.
///
/// Count-bounded: pushing into a full buffer evicts the oldest entry, after
/// which a retransmission reaching back that far is no longer possible.
#[derive(Debug, Clone)]
pub struct RetransmissionBuffer {
    entries: VecDeque<(u32, Bytes)>,
    capacity: usize,
    lost_through: Option<u32>,
}

impl RetransmissionBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            lost_through: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remember a DATA payload sent with sequence number `seq`.
    pub fn push(&mut self, seq: u32, payload: Bytes) {
        if self.entries.len() == self.capacity {
            if let Some((evicted, _)) = self.entries.pop_front() {
                debug!(seq = evicted, "evicting unconfirmed payload");
                self.lost_through = Some(evicted);
            }
        }
        self.entries.push_back((seq, payload));
    }

    /// Drop everything the peer confirmed, up to and including `through`.
    pub fn confirm(&mut self, through: u32) {
        while let Some((seq, _)) = self.entries.front() {
            if !seq_le(*seq, through) {
                break;
            }
            self.entries.pop_front();
        }
        if self.lost_through.is_some_and(|lost| seq_le(lost, through)) {
            self.lost_through = None;
        }
    }

    /// Whether every payload from `from` on can still be replayed.
    pub fn has_unsent_range(&self, from: u32) -> bool {
        match self.lost_through {
            Some(lost) => !seq_le(from, lost),
            None => true,
        }
    }

    /// Take the payloads sent with sequence numbers from `from` on, oldest
    /// first. The caller sends them again under new sequence numbers and
    /// pushes them back.
    pub fn replay(&mut self, from: u32) -> Vec<Bytes> {
        let start = self
            .entries
            .iter()
            .position(|(seq, _)| seq_le(from, *seq))
            .unwrap_or(self.entries.len());
        self.entries
            .drain(start..)
            .map(|(_, payload)| payload)
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.lost_through = None;
    }
}
