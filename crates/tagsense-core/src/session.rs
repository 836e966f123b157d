//! Per-reader poll, classify and debounce state machine.
//!
//! Every call to [`ReaderSession::poll`] runs one cycle:
//!
//! 1. Probe for a presence event. A negative probe is repeated once, because
//!    the probe alternates while a tag rests on the antenna; only two
//!    negatives in a row read as [`Reading::Absent`].
//! 2. On presence, select the tag and read its UID. A hard protocol failure
//!    rejects the cycle. A timeout status is tolerated.
//! 3. Validate the reported UID length and the chip type. Failure rejects
//!    the cycle.
//! 4. Capture the UID as the current tag and compare it with the companion.
//! 5. Feed the candidate classification through the debounce filter.
//!
//! Rejected cycles leave the confirmed classification and the debounce
//! counter untouched.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classification::Classification;
use crate::config::{DebounceConfig, DebouncePolicy};
use crate::driver::{DriverError, ReadStatus, ReaderChannel, TagType};
use crate::identifier::Identifier;

/// Stable index of a reader within a registry, in registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReaderId(pub u8);

impl ReaderId {
    /// The index as `usize`, for table lookups.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl fmt::Display for ReaderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A confirmed change of a reader's classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Reader that changed.
    pub reader: ReaderId,
    /// Previously confirmed classification.
    pub from: Classification,
    /// Newly confirmed classification.
    pub to: Classification,
    /// When the change was confirmed.
    pub at_utc: DateTime<Utc>,
}

/// Receiver of confirmed transitions.
///
/// Called synchronously from the poll loop, so implementations must not block.
pub trait TransitionHandler: Send {
    /// Called once per confirmed transition with the new classification.
    fn on_transition(&mut self, reader: ReaderId, classification: Classification);
}

impl<F> TransitionHandler for F
where
    F: FnMut(ReaderId, Classification) + Send,
{
    fn on_transition(&mut self, reader: ReaderId, classification: Classification) {
        self(reader, classification);
    }
}

/// Why a cycle's read was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The driver returned a status other than success or tolerated timeout.
    Protocol(u8),
    /// The reported UID length is not 4, 7 or 10.
    InvalidLength(usize),
    /// The chip type is unknown or the UID is incomplete.
    UnusableType(TagType),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(code) => write!(f, "select failed with status {code}"),
            Self::InvalidLength(len) => write!(f, "invalid UID length {len}"),
            Self::UnusableType(tag_type) => write!(f, "unusable tag type {tag_type:?}"),
        }
    }
}

/// Outcome of one poll cycle before debouncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    /// Two negative presence probes.
    Absent,
    /// A validated tag, classified against the companion.
    Tag(Classification),
    /// The read was discarded; contributes nothing to debouncing.
    Rejected(RejectReason),
}

impl Reading {
    /// The debounce candidate, or `None` for a rejected read.
    #[must_use]
    pub const fn candidate(self) -> Option<Classification> {
        match self {
            Self::Absent => Some(Classification::Absent),
            Self::Tag(classification) => Some(classification),
            Self::Rejected(_) => None,
        }
    }
}

/// One reader channel and its debounced classification.
pub struct ReaderSession<C> {
    id: ReaderId,
    channel: C,
    companion: Identifier,
    current_tag: Identifier,
    confirmed: Classification,
    pending: Classification,
    last_reading: Option<Reading>,
    debounce_count: u8,
    debounce: DebounceConfig,
    notifier: Option<Box<dyn TransitionHandler>>,
}

impl<C: ReaderChannel> ReaderSession<C> {
    /// Create a session and initialize its channel.
    ///
    /// # Errors
    ///
    /// Returns the driver's error if the reader chip fails to initialize.
    pub fn new(
        id: ReaderId,
        mut channel: C,
        companion: Identifier,
        debounce: DebounceConfig,
    ) -> Result<Self, DriverError> {
        if debounce.threshold < DebounceConfig::MIN_THRESHOLD {
            warn!(
                reader = %id,
                threshold = debounce.threshold,
                "Debounce threshold raised to {}",
                DebounceConfig::MIN_THRESHOLD
            );
        }
        let debounce = debounce.clamped();

        channel.initialize()?;
        match channel.firmware_version() {
            Some(version) => info!(reader = %id, "Reader firmware version 0x{version:02x}"),
            None => info!(reader = %id, "Reader firmware version unavailable"),
        }

        Ok(Self {
            id,
            channel,
            companion,
            current_tag: Identifier::ZERO,
            confirmed: Classification::Absent,
            pending: Classification::Absent,
            last_reading: None,
            debounce_count: 0,
            debounce,
            notifier: None,
        })
    }

    /// Install the transition notifier, replacing any previous one.
    pub fn set_notifier(&mut self, notifier: impl TransitionHandler + 'static) {
        self.notifier = Some(Box::new(notifier));
    }

    /// Run one poll cycle.
    ///
    /// Returns the transition if this cycle confirmed one.
    pub fn poll(&mut self) -> Option<Transition> {
        let reading = self.read_cycle();
        self.last_reading = Some(reading);

        let Some(candidate) = reading.candidate() else {
            if let Reading::Rejected(reason) = reading {
                warn!(reader = %self.id, "Discarding read: {reason}");
            }
            return None;
        };

        debug!(
            reader = %self.id,
            %candidate,
            confirmed = %self.confirmed,
            count = self.debounce_count,
            "Poll cycle"
        );
        self.pending = candidate;
        self.debounce(candidate)
    }

    /// Zero the current tag without touching classification or debounce state.
    pub fn clear_uid_cache(&mut self) {
        self.current_tag = Identifier::ZERO;
    }

    fn read_cycle(&mut self) -> Reading {
        if self.channel.has_new_presence_event() {
            return self.interpret_tag();
        }
        // The presence probe alternates during a single dwell; ask again
        // before calling the tag gone.
        if self.channel.has_new_presence_event() {
            return self.interpret_tag();
        }
        Reading::Absent
    }

    fn interpret_tag(&mut self) -> Reading {
        let read = self.channel.select_and_read();
        if let ReadStatus::HardFail(code) = read.status {
            return Reading::Rejected(RejectReason::Protocol(code));
        }

        if !read.raw.has_valid_length() {
            return Reading::Rejected(RejectReason::InvalidLength(read.raw.reported_len()));
        }

        let tag_type = self.channel.classify_tag_type(read.signature);
        if !tag_type.is_usable() {
            return Reading::Rejected(RejectReason::UnusableType(tag_type));
        }

        self.current_tag = Identifier::from_raw(&read.raw);
        // A zero companion means none is configured.
        if !self.companion.is_zero() && self.companion.equals(&self.current_tag) {
            Reading::Tag(Classification::PresentCompanion)
        } else {
            Reading::Tag(Classification::PresentUnknown)
        }
    }

    fn debounce(&mut self, candidate: Classification) -> Option<Transition> {
        if candidate == self.confirmed {
            if self.debounce.policy == DebouncePolicy::ResetOnAgreement {
                self.debounce_count = 0;
            }
            return None;
        }

        self.debounce_count = self.debounce_count.saturating_add(1);
        if self.debounce_count < self.debounce.threshold {
            return None;
        }

        let transition = Transition {
            reader: self.id,
            from: self.confirmed,
            to: candidate,
            at_utc: Utc::now(),
        };
        self.confirmed = candidate;
        self.debounce_count = 0;

        info!(
            reader = %self.id,
            from = %transition.from,
            to = %transition.to,
            tag = %self.current_tag,
            "Reader state changed"
        );
        if let Some(notifier) = self.notifier.as_mut() {
            notifier.on_transition(self.id, candidate);
        }

        Some(transition)
    }
}

impl<C> ReaderSession<C> {
    /// This reader's ID.
    #[must_use]
    pub const fn id(&self) -> ReaderId {
        self.id
    }

    /// The configured companion identifier.
    #[must_use]
    pub const fn companion(&self) -> &Identifier {
        &self.companion
    }

    /// UID of the last validated read, or zero after a cache clear.
    #[must_use]
    pub const fn current_tag(&self) -> &Identifier {
        &self.current_tag
    }

    /// The confirmed classification.
    #[must_use]
    pub const fn confirmed(&self) -> Classification {
        self.confirmed
    }

    /// The candidate of the most recent non-rejected cycle.
    #[must_use]
    pub const fn pending(&self) -> Classification {
        self.pending
    }

    /// Outcome of the most recent cycle, if any ran.
    #[must_use]
    pub const fn last_reading(&self) -> Option<Reading> {
        self.last_reading
    }

    /// Disagreeing cycles counted toward the next transition.
    #[must_use]
    pub const fn debounce_count(&self) -> u8 {
        self.debounce_count
    }

    /// Debounce settings in effect.
    #[must_use]
    pub const fn debounce_config(&self) -> DebounceConfig {
        self.debounce
    }

    /// The channel this session drives.
    #[must_use]
    pub const fn channel(&self) -> &C {
        &self.channel
    }

    /// Mutable access to the channel.
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }
}

impl<C> fmt::Debug for ReaderSession<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderSession")
            .field("id", &self.id)
            .field("companion", &self.companion)
            .field("current_tag", &self.current_tag)
            .field("confirmed", &self.confirmed)
            .field("pending", &self.pending)
            .field("debounce_count", &self.debounce_count)
            .field("has_notifier", &self.notifier.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::driver::{ChannelConfig, RawRead};
    use crate::mock::{MockChannel, MockCycle};

    const COMPANION: [u8; 4] = [1, 2, 3, 4];

    type Notifications = Arc<Mutex<Vec<(ReaderId, Classification)>>>;

    fn session_with(debounce: DebounceConfig) -> (ReaderSession<MockChannel>, Notifications) {
        let channel = MockChannel::new(ChannelConfig::new(10, 9));
        let mut session = ReaderSession::new(
            ReaderId(0),
            channel,
            Identifier::from_slice(&COMPANION),
            debounce,
        )
        .unwrap();

        let seen: Notifications = Arc::default();
        let sink = Arc::clone(&seen);
        session.set_notifier(move |reader: ReaderId, classification: Classification| {
            sink.lock().unwrap().push((reader, classification));
        });
        (session, seen)
    }

    fn session() -> (ReaderSession<MockChannel>, Notifications) {
        session_with(DebounceConfig::default())
    }

    fn poll_n(session: &mut ReaderSession<MockChannel>, n: usize) -> Vec<Transition> {
        (0..n).filter_map(|_| session.poll()).collect()
    }

    #[test]
    fn test_new_session_initializes_channel() {
        let (session, _) = session();
        assert_eq!(session.channel().initializations(), 1);
        assert_eq!(session.confirmed(), Classification::Absent);
        assert_eq!(session.debounce_count(), 0);
        assert!(session.last_reading().is_none());
    }

    #[test]
    fn test_companion_confirmed_after_five_cycles() {
        let (mut session, seen) = session();
        session
            .channel_mut()
            .push_repeated(MockCycle::Tag(RawRead::ok(&COMPANION)), 5);

        let transitions = poll_n(&mut session, 4);
        assert!(transitions.is_empty());
        assert_eq!(session.confirmed(), Classification::Absent);
        assert_eq!(session.debounce_count(), 4);

        let transition = session.poll().unwrap();
        assert_eq!(transition.from, Classification::Absent);
        assert_eq!(transition.to, Classification::PresentCompanion);
        assert_eq!(session.confirmed(), Classification::PresentCompanion);
        assert_eq!(session.debounce_count(), 0);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(ReaderId(0), Classification::PresentCompanion)]
        );
    }

    #[test]
    fn test_unknown_tag_confirmed() {
        let (mut session, seen) = session();
        session
            .channel_mut()
            .push_repeated(MockCycle::Tag(RawRead::ok(&[9, 9, 9, 9])), 5);

        poll_n(&mut session, 5);
        assert_eq!(session.confirmed(), Classification::PresentUnknown);
        assert_eq!(session.current_tag(), &Identifier::from_slice(&[9, 9, 9, 9]));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_absence_before_threshold_blocks_transition() {
        let (mut session, seen) = session();
        session
            .channel_mut()
            .push_repeated(MockCycle::Tag(RawRead::ok(&COMPANION)), 4)
            .push(MockCycle::Absent);

        assert!(poll_n(&mut session, 5).is_empty());
        assert_eq!(session.confirmed(), Classification::Absent);
        assert_eq!(session.last_reading(), Some(Reading::Absent));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_agreement_resets_counter_by_default() {
        let (mut session, _) = session();
        session
            .channel_mut()
            .push_repeated(MockCycle::Tag(RawRead::ok(&COMPANION)), 4)
            .push(MockCycle::Absent)
            .push(MockCycle::Tag(RawRead::ok(&COMPANION)));

        poll_n(&mut session, 6);
        assert_eq!(session.debounce_count(), 1);
        assert_eq!(session.confirmed(), Classification::Absent);
    }

    #[test]
    fn test_accumulate_policy_keeps_counter_on_agreement() {
        let (mut session, _) = session_with(DebounceConfig {
            threshold: 5,
            policy: DebouncePolicy::Accumulate,
        });
        session
            .channel_mut()
            .push_repeated(MockCycle::Tag(RawRead::ok(&COMPANION)), 4)
            .push(MockCycle::Absent)
            .push(MockCycle::Tag(RawRead::ok(&COMPANION)));

        let transitions = poll_n(&mut session, 6);
        assert_eq!(transitions.len(), 1);
        assert_eq!(session.confirmed(), Classification::PresentCompanion);
    }

    #[test]
    fn test_hard_failure_leaves_state_untouched() {
        let (mut session, seen) = session();
        session
            .channel_mut()
            .push_repeated(MockCycle::Tag(RawRead::ok(&COMPANION)), 3)
            .push(MockCycle::Tag(
                RawRead::ok(&COMPANION).with_status(ReadStatus::HardFail(2)),
            ));

        poll_n(&mut session, 3);
        let count_before = session.debounce_count();
        assert!(session.poll().is_none());

        assert_eq!(session.debounce_count(), count_before);
        assert_eq!(session.confirmed(), Classification::Absent);
        assert_eq!(
            session.last_reading(),
            Some(Reading::Rejected(RejectReason::Protocol(2)))
        );
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_hard_failure_does_not_clear_confirmed_presence() {
        let (mut session, _) = session();
        session
            .channel_mut()
            .push_repeated(MockCycle::Tag(RawRead::ok(&COMPANION)), 5)
            .push_repeated(
                MockCycle::Tag(RawRead::ok(&COMPANION).with_status(ReadStatus::HardFail(1))),
                10,
            );

        poll_n(&mut session, 15);
        assert_eq!(session.confirmed(), Classification::PresentCompanion);
        assert_eq!(session.debounce_count(), 0);
    }

    #[test]
    fn test_tolerated_timeout_is_accepted() {
        let (mut session, _) = session();
        session.channel_mut().push_repeated(
            MockCycle::Tag(RawRead::ok(&COMPANION).with_status(ReadStatus::ToleratedTimeout)),
            5,
        );

        poll_n(&mut session, 5);
        assert_eq!(session.confirmed(), Classification::PresentCompanion);
    }

    #[test]
    fn test_invalid_length_is_rejected() {
        let (mut session, _) = session();
        session
            .channel_mut()
            .push(MockCycle::Tag(RawRead::ok(&[1, 2, 3, 4, 5])));

        assert!(session.poll().is_none());
        assert_eq!(
            session.last_reading(),
            Some(Reading::Rejected(RejectReason::InvalidLength(5)))
        );
        assert_eq!(session.debounce_count(), 0);
        assert!(session.current_tag().is_zero());
    }

    #[test]
    fn test_unusable_tag_type_is_rejected() {
        let (mut session, _) = session();
        session
            .channel_mut()
            .push(MockCycle::Tag(RawRead::ok(&COMPANION).with_signature(0x04)))
            .push(MockCycle::Tag(RawRead::ok(&COMPANION).with_signature(0x7F)));

        session.poll();
        assert_eq!(
            session.last_reading(),
            Some(Reading::Rejected(RejectReason::UnusableType(TagType::NotComplete)))
        );
        session.poll();
        assert_eq!(
            session.last_reading(),
            Some(Reading::Rejected(RejectReason::UnusableType(TagType::Unknown)))
        );
        assert_eq!(session.debounce_count(), 0);
    }

    #[test]
    fn test_flickering_presence_still_reads_tag() {
        let (mut session, _) = session();
        session
            .channel_mut()
            .push(MockCycle::Tag(RawRead::ok(&COMPANION)))
            .push(MockCycle::Flicker(RawRead::ok(&COMPANION)))
            .push(MockCycle::Tag(RawRead::ok(&COMPANION)))
            .push(MockCycle::Flicker(RawRead::ok(&COMPANION)))
            .push(MockCycle::Tag(RawRead::ok(&COMPANION)));

        poll_n(&mut session, 5);
        assert_eq!(session.confirmed(), Classification::PresentCompanion);
        assert_eq!(session.channel().probes(), 7);
    }

    #[test]
    fn test_tag_removal_is_confirmed() {
        let (mut session, seen) = session();
        session
            .channel_mut()
            .push_repeated(MockCycle::Tag(RawRead::ok(&COMPANION)), 5)
            .push_repeated(MockCycle::Absent, 5);

        poll_n(&mut session, 10);
        assert_eq!(session.confirmed(), Classification::Absent);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (ReaderId(0), Classification::PresentCompanion),
                (ReaderId(0), Classification::Absent),
            ]
        );
    }

    #[test]
    fn test_steady_input_is_idempotent() {
        let (mut companion_session, seen) = session();
        companion_session
            .channel_mut()
            .push_repeated(MockCycle::Tag(RawRead::ok(&COMPANION)), 40);

        poll_n(&mut companion_session, 40);
        assert_eq!(seen.lock().unwrap().len(), 1);

        let (mut absent, seen) = session();
        poll_n(&mut absent, 40);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_mixed_disagreement_confirms_latest_candidate() {
        let (mut session, _) = session();
        session
            .channel_mut()
            .push_repeated(MockCycle::Tag(RawRead::ok(&[9, 9, 9, 9])), 4)
            .push(MockCycle::Tag(RawRead::ok(&COMPANION)));

        let transition = poll_n(&mut session, 5).pop().unwrap();
        assert_eq!(transition.to, Classification::PresentCompanion);
    }

    #[test]
    fn test_zero_companion_never_matches() {
        let channel = MockChannel::new(ChannelConfig::new(10, 9));
        let mut session = ReaderSession::new(
            ReaderId(3),
            channel,
            Identifier::ZERO,
            DebounceConfig::default(),
        )
        .unwrap();
        session
            .channel_mut()
            .push_repeated(MockCycle::Tag(RawRead::ok(&[0, 0, 0, 0])), 5);

        let transition = poll_n(&mut session, 5).pop().unwrap();
        assert_eq!(transition.reader, ReaderId(3));
        assert_eq!(transition.to, Classification::PresentUnknown);
    }

    #[test]
    fn test_clear_uid_cache_keeps_classification() {
        let (mut session, _) = session();
        session
            .channel_mut()
            .push_repeated(MockCycle::Tag(RawRead::ok(&COMPANION)), 7);
        poll_n(&mut session, 7);

        session.clear_uid_cache();
        assert!(session.current_tag().is_zero());
        assert_eq!(session.confirmed(), Classification::PresentCompanion);
        assert_eq!(session.pending(), Classification::PresentCompanion);
    }

    #[test]
    fn test_custom_threshold() {
        let (mut session, _) = session_with(DebounceConfig {
            threshold: 1,
            policy: DebouncePolicy::ResetOnAgreement,
        });
        session
            .channel_mut()
            .push(MockCycle::Tag(RawRead::ok(&COMPANION)));

        assert!(session.poll().is_some());
    }

    #[test]
    fn test_zero_threshold_runs_as_one() {
        let (mut zero, seen) = session_with(DebounceConfig {
            threshold: 0,
            policy: DebouncePolicy::ResetOnAgreement,
        });
        assert_eq!(zero.debounce_config().threshold, 1);

        // Agreement with the initial Absent never confirms anything.
        poll_n(&mut zero, 3);
        assert!(seen.lock().unwrap().is_empty());

        zero.channel_mut()
            .push(MockCycle::Tag(RawRead::ok(&COMPANION)));
        let transition = zero.poll().unwrap();
        assert_eq!(transition.to, Classification::PresentCompanion);
        assert_eq!(zero.debounce_count(), 0);
    }

    #[test]
    fn test_notification_count_is_bounded() {
        // Deterministic pseudo-random mix of cycles.
        let (mut session, seen) = session();
        let mut seed: u32 = 0x1234_5678;
        let cycles = 500;
        for _ in 0..cycles {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
            let cycle = match (seed >> 16) % 5 {
                0 => MockCycle::Absent,
                1 => MockCycle::Tag(RawRead::ok(&COMPANION)),
                2 => MockCycle::Flicker(RawRead::ok(&[7, 7, 7, 7])),
                3 => MockCycle::Tag(RawRead::ok(&COMPANION).with_status(ReadStatus::HardFail(4))),
                _ => MockCycle::Tag(RawRead::ok(&[1, 2, 3])),
            };
            session.channel_mut().push(cycle);
        }

        let transitions = poll_n(&mut session, cycles);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), transitions.len());
        assert!(seen.len() <= cycles / 5);

        let mut previous = Classification::Absent;
        for transition in &transitions {
            assert_eq!(transition.from, previous);
            assert_ne!(transition.to, previous);
            previous = transition.to;
        }
        assert_eq!(session.confirmed(), previous);
    }
}
