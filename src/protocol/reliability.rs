//! Confirmation tracking and retransmission
//!
//! Every outgoing message whose class requires acknowledgment is held here,
//! keyed by its checksum, until the peer echoes that checksum back in a
//! WORD/CONFIRMATION or the retry budget runs out.
//!
//! The receiving side remembers the checksums it applied recently. A lost
//! confirmation makes the peer retransmit a message that was already
//! applied; the copy is confirmed again but not applied twice.

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::{ReliabilityConfig, Tick};
use super::catalog::ConfirmationPolicy;
use super::message::{Message, Subtype};
use super::payload::confirmation_message;

/// An outgoing message awaiting acknowledgment
#[derive(Debug, Clone)]
pub struct PendingConfirmation {
    /// Checksum the confirmation must carry
    pub checksum: u16,
    /// Subtype of the pending message
    pub subtype: Subtype,
    /// Tick of the most recent transmission
    pub sent_at: Tick,
    /// Retransmissions made so far
    pub retries: u32,
    /// Encoded frame, kept for retransmission
    frame: Bytes,
    /// Registration order, used to retransmit oldest first
    sequence: u64,
}

/// A message the peer never acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFailure {
    /// Checksum of the abandoned message
    pub checksum: u16,
    /// Subtype of the abandoned message
    pub subtype: Subtype,
    /// Transmissions made, including the first
    pub attempts: u32,
}

/// Work produced by a reliability poll
#[derive(Debug, Default)]
pub struct ReliabilityPoll {
    /// Frames to write again, oldest registration first
    pub retransmit: Vec<Bytes>,
    /// Messages whose retry budget is exhausted
    pub failed: Vec<DeliveryFailure>,
}

/// Tracks pending confirmations for one end of the link
#[derive(Debug)]
pub struct ReliabilityManager {
    config: ReliabilityConfig,
    pending: HashMap<u16, PendingConfirmation>,
    next_sequence: u64,
    /// Checksums of received messages applied within the duplicate window
    applied: HashMap<u16, Tick>,
}

impl ReliabilityManager {
    /// Creates a new reliability manager
    pub fn new(config: ReliabilityConfig) -> Self {
        ReliabilityManager {
            config,
            pending: HashMap::new(),
            next_sequence: 0,
            applied: HashMap::new(),
        }
    }

    /// Active confirmation policy
    pub fn policy(&self) -> &ConfirmationPolicy {
        &self.config.policy
    }

    /// Returns true if messages of this subtype must be acknowledged
    pub fn needs_confirmation(&self, subtype: Subtype) -> bool {
        self.config.policy.needs_confirmation(subtype)
    }

    /// Records an outgoing message; returns true if it is now awaiting confirmation
    ///
    /// A message whose checksum is already pending refreshes that entry: on
    /// the wire the two are indistinguishable to a confirmation.
    pub fn register(&mut self, message: &Message, frame: Bytes, now: Tick) -> bool {
        if !self.needs_confirmation(message.subtype()) {
            return false;
        }

        let checksum = message.checksum();
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        if self.pending.contains_key(&checksum) {
            debug!(checksum, "Checksum already pending, refreshing entry");
        }

        self.pending.insert(
            checksum,
            PendingConfirmation {
                checksum,
                subtype: message.subtype(),
                sent_at: now,
                retries: 0,
                frame,
                sequence,
            },
        );
        true
    }

    /// Resolves an incoming confirmation; returns true if it matched a pending message
    pub fn confirm(&mut self, checksum: u16) -> bool {
        match self.pending.remove(&checksum) {
            Some(entry) => {
                debug!(checksum, retries = entry.retries, "Message confirmed");
                true
            }
            None => {
                debug!(checksum, "Ignoring unmatched confirmation");
                false
            }
        }
    }

    /// Builds the confirmation owed for a received frame, if its class needs one
    pub fn acknowledgment_for(&self, subtype: Subtype, checksum: u16) -> Option<Message> {
        if self.needs_confirmation(subtype) {
            Some(confirmation_message(checksum))
        } else {
            None
        }
    }

    /// Ticks during which a retransmitted copy of an applied message can still arrive
    ///
    /// Covers the first transmission plus every retry, assuming the peer
    /// runs the same timeout and retry budget.
    pub fn duplicate_window(&self) -> Tick {
        self.config
            .confirmation_timeout
            .saturating_mul(Tick::from(self.config.max_retries) + 1)
    }

    /// Returns true if a received message with this checksum was applied
    /// within the duplicate window
    pub fn recently_applied(&self, checksum: u16, now: Tick) -> bool {
        match self.applied.get(&checksum) {
            Some(&at) => now.saturating_sub(at) < self.duplicate_window(),
            None => false,
        }
    }

    /// Remembers that a received message was applied
    ///
    /// The window is anchored at the first application; later copies do not
    /// extend it.
    pub fn mark_applied(&mut self, checksum: u16, now: Tick) {
        let window = self.duplicate_window();
        let expired = match self.applied.get(&checksum) {
            Some(&at) => now.saturating_sub(at) >= window,
            None => true,
        };
        if expired {
            self.applied.insert(checksum, now);
        }
    }

    /// Forgets which received messages were applied
    ///
    /// Called when a new connection starts, since the peer may then send a
    /// message identical to one it sent before.
    pub fn forget_applied(&mut self) {
        self.applied.clear();
    }

    /// Collects retransmissions that are due and drops exhausted entries
    pub fn poll(&mut self, now: Tick) -> ReliabilityPoll {
        let timeout = self.config.confirmation_timeout;
        let max_retries = self.config.max_retries;

        let window = self.duplicate_window();
        self.applied.retain(|_, at| now.saturating_sub(*at) < window);

        let mut due: Vec<(u64, u16)> = self
            .pending
            .values()
            .filter(|p| now.saturating_sub(p.sent_at) >= timeout)
            .map(|p| (p.sequence, p.checksum))
            .collect();
        due.sort_unstable();

        let mut outcome = ReliabilityPoll::default();
        for (_, checksum) in due {
            let exhausted = match self.pending.get(&checksum) {
                Some(entry) => entry.retries >= max_retries,
                None => continue,
            };

            if exhausted {
                if let Some(entry) = self.pending.remove(&checksum) {
                    warn!(
                        checksum,
                        subtype = ?entry.subtype,
                        attempts = entry.retries + 1,
                        "Delivery failed, giving up"
                    );
                    outcome.failed.push(DeliveryFailure {
                        checksum,
                        subtype: entry.subtype,
                        attempts: entry.retries + 1,
                    });
                }
            } else if let Some(entry) = self.pending.get_mut(&checksum) {
                entry.retries += 1;
                entry.sent_at = now;
                debug!(checksum, retry = entry.retries, "Retransmitting unconfirmed message");
                outcome.retransmit.push(entry.frame.clone());
            }
        }
        outcome
    }

    /// Number of messages awaiting confirmation
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if a message with this checksum is awaiting confirmation
    pub fn is_pending(&self, checksum: u16) -> bool {
        self.pending.contains_key(&checksum)
    }

    /// Looks up a pending entry
    pub fn pending(&self, checksum: u16) -> Option<&PendingConfirmation> {
        self.pending.get(&checksum)
    }

    /// Forgets every pending message and applied checksum, e.g. after the
    /// transport was lost
    pub fn clear(&mut self) {
        if !self.pending.is_empty() {
            debug!(count = self.pending.len(), "Clearing pending confirmations");
        }
        self.pending.clear();
        self.applied.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::message::{DataSubtype, WaypointSubtype, WordSubtype};

    fn manager(timeout: Tick, max_retries: u32) -> ReliabilityManager {
        ReliabilityManager::new(ReliabilityConfig {
            confirmation_timeout: timeout,
            max_retries,
            policy: ConfirmationPolicy::default(),
        })
    }

    fn frame_for(message: &Message) -> Bytes {
        Bytes::from(vec![message.label().pack()])
    }

    #[test]
    fn test_confirmation_lifecycle() {
        let mut rm = manager(100, 3);
        let msg = Message::new(WaypointSubtype::Add, vec![1, 2, 3]).unwrap();

        assert!(rm.register(&msg, frame_for(&msg), 0));
        assert_eq!(rm.pending_count(), 1);
        assert_eq!(rm.pending(msg.checksum()).unwrap().retries, 0);

        // Unrelated confirmation leaves it untouched
        assert!(!rm.confirm(msg.checksum().wrapping_add(1)));
        assert_eq!(rm.pending_count(), 1);

        assert!(rm.confirm(msg.checksum()));
        assert_eq!(rm.pending_count(), 0);

        // Duplicate confirmation is ignored
        assert!(!rm.confirm(msg.checksum()));
    }

    #[test]
    fn test_unconfirmed_classes_not_registered() {
        let mut rm = manager(100, 3);
        let telemetry = Message::new(DataSubtype::Telemetry, vec![0, 0, 0, 0, 0]).unwrap();
        let sync = Message::new(WordSubtype::Sync, vec![0]).unwrap();
        let confirmation = confirmation_message(0x1234);

        assert!(!rm.register(&telemetry, frame_for(&telemetry), 0));
        assert!(!rm.register(&sync, frame_for(&sync), 0));
        assert!(!rm.register(&confirmation, frame_for(&confirmation), 0));
        assert_eq!(rm.pending_count(), 0);
    }

    #[test]
    fn test_retransmit_then_fail() {
        let mut rm = manager(100, 2);
        let msg = Message::new(DataSubtype::Setting, vec![1, 0, 0, 0, 0]).unwrap();
        let frame = frame_for(&msg);
        rm.register(&msg, frame.clone(), 0);

        // Not yet due
        let poll = rm.poll(99);
        assert!(poll.retransmit.is_empty() && poll.failed.is_empty());

        let poll = rm.poll(100);
        assert_eq!(poll.retransmit, vec![frame.clone()]);
        let poll = rm.poll(200);
        assert_eq!(poll.retransmit, vec![frame]);

        let poll = rm.poll(300);
        assert!(poll.retransmit.is_empty());
        assert_eq!(
            poll.failed,
            vec![DeliveryFailure {
                checksum: msg.checksum(),
                subtype: msg.subtype(),
                attempts: 3,
            }]
        );
        assert_eq!(rm.pending_count(), 0);
    }

    #[test]
    fn test_retransmit_order_follows_registration() {
        let mut rm = manager(10, 5);
        let frames: Vec<(Message, Bytes)> = (0..4u8)
            .map(|i| {
                let m = Message::new(WordSubtype::Command, vec![4, i]).unwrap();
                let f = Bytes::from(vec![i]);
                (m, f)
            })
            .collect();
        for (m, f) in &frames {
            rm.register(m, f.clone(), 0);
        }

        let poll = rm.poll(10);
        let expected: Vec<Bytes> = frames.iter().map(|(_, f)| f.clone()).collect();
        assert_eq!(poll.retransmit, expected);
    }

    #[test]
    fn test_acknowledgment_for_received_frames() {
        let rm = manager(100, 3);
        let ack = rm
            .acknowledgment_for(Subtype::Word(WordSubtype::Command), 0xBEEF)
            .unwrap();
        assert_eq!(ack.subtype(), Subtype::Word(WordSubtype::Confirmation));
        assert_eq!(ack.payload(), &[0xBE, 0xEF]);

        assert!(rm
            .acknowledgment_for(Subtype::Word(WordSubtype::Confirmation), 0xBEEF)
            .is_none());
        assert!(rm
            .acknowledgment_for(Subtype::Data(DataSubtype::Telemetry), 0xBEEF)
            .is_none());
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut rm = manager(100, 3);
        let msg = Message::new(WaypointSubtype::Alter, vec![0; 11]).unwrap();
        rm.register(&msg, frame_for(&msg), 0);
        rm.clear();
        assert_eq!(rm.pending_count(), 0);
        assert!(rm.poll(1_000).failed.is_empty());
    }

    #[test]
    fn test_applied_window() {
        // Window covers the first send and two retries
        let mut rm = manager(100, 2);
        assert_eq!(rm.duplicate_window(), 300);
        assert!(!rm.recently_applied(0xABCD, 0));

        rm.mark_applied(0xABCD, 10);
        assert!(rm.recently_applied(0xABCD, 10));
        assert!(rm.recently_applied(0xABCD, 309));
        assert!(!rm.recently_applied(0xBEEF, 20));

        // A copy inside the window does not extend it
        rm.mark_applied(0xABCD, 200);
        assert!(!rm.recently_applied(0xABCD, 310));

        // Expired entries are pruned and may be applied again
        rm.poll(310);
        assert!(rm.applied.is_empty());
        rm.mark_applied(0xABCD, 400);
        assert!(rm.recently_applied(0xABCD, 450));

        rm.forget_applied();
        assert!(!rm.recently_applied(0xABCD, 450));

        rm.mark_applied(0x1111, 500);
        rm.clear();
        assert!(!rm.recently_applied(0x1111, 500));
    }

    #[test]
    fn test_duplicate_checksum_refreshes_entry() {
        let mut rm = manager(100, 3);
        let msg = Message::new(WaypointSubtype::Add, vec![5; 11]).unwrap();
        rm.register(&msg, frame_for(&msg), 0);
        rm.poll(100);
        assert_eq!(rm.pending(msg.checksum()).unwrap().retries, 1);

        rm.register(&msg, frame_for(&msg), 150);
        assert_eq!(rm.pending_count(), 1);
        let entry = rm.pending(msg.checksum()).unwrap();
        assert_eq!(entry.retries, 0);
        assert_eq!(entry.sent_at, 150);
    }
}
