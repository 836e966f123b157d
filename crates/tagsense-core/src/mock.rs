//! Scripted reader channel for tests and hardware-less development.

use std::collections::VecDeque;

use crate::driver::{ChannelConfig, DriverError, RawRead, ReadStatus, ReaderChannel};
use crate::identifier::RawIdentifier;

/// What the mock reader does during one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockCycle {
    /// Both presence probes answer `false`.
    Absent,
    /// The first presence probe answers `true`, then `read` is served.
    Tag(RawRead),
    /// The first probe answers `false`, the second `true`, then `read` is served.
    Flicker(RawRead),
}

/// A [`ReaderChannel`] that replays a script of poll cycles.
///
/// Once the script runs out every cycle reads as absent.
#[derive(Debug, Clone)]
pub struct MockChannel {
    config: ChannelConfig,
    presence: VecDeque<bool>,
    reads: VecDeque<RawRead>,
    probes: usize,
    reads_served: usize,
    initializations: usize,
}

impl MockChannel {
    /// Select line on which [`ReaderChannel::open`] fails.
    pub const UNAVAILABLE_LINE: u8 = u8::MAX;

    /// Driver status served when a read is requested that the script lacks.
    pub const UNSCRIPTED_READ_STATUS: u8 = 0xEE;

    /// Create an idle mock for the given lines.
    #[must_use]
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            config,
            presence: VecDeque::new(),
            reads: VecDeque::new(),
            probes: 0,
            reads_served: 0,
            initializations: 0,
        }
    }

    /// Append one cycle to the script.
    pub fn push(&mut self, cycle: MockCycle) -> &mut Self {
        match cycle {
            MockCycle::Absent => {
                self.presence.extend([false, false]);
            }
            MockCycle::Tag(read) => {
                self.presence.push_back(true);
                self.reads.push_back(read);
            }
            MockCycle::Flicker(read) => {
                self.presence.extend([false, true]);
                self.reads.push_back(read);
            }
        }
        self
    }

    /// Append the same cycle `count` times.
    pub fn push_repeated(&mut self, cycle: MockCycle, count: usize) -> &mut Self {
        for _ in 0..count {
            self.push(cycle);
        }
        self
    }

    /// The lines this mock was opened on.
    #[must_use]
    pub const fn config(&self) -> ChannelConfig {
        self.config
    }

    /// Number of presence probes answered so far.
    #[must_use]
    pub const fn probes(&self) -> usize {
        self.probes
    }

    /// Number of select/read requests served so far.
    #[must_use]
    pub const fn reads_served(&self) -> usize {
        self.reads_served
    }

    /// Number of times [`ReaderChannel::initialize`] ran.
    #[must_use]
    pub const fn initializations(&self) -> usize {
        self.initializations
    }

    /// Returns `true` once every scripted cycle has been consumed.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.presence.is_empty() && self.reads.is_empty()
    }
}

impl ReaderChannel for MockChannel {
    fn open(config: &ChannelConfig) -> Result<Self, DriverError> {
        if config.select_line == Self::UNAVAILABLE_LINE {
            return Err(DriverError::OpenFailed {
                select_line: config.select_line,
                message: "line unavailable".to_string(),
            });
        }
        Ok(Self::new(*config))
    }

    fn initialize(&mut self) -> Result<(), DriverError> {
        self.initializations += 1;
        Ok(())
    }

    fn has_new_presence_event(&mut self) -> bool {
        self.probes += 1;
        self.presence.pop_front().unwrap_or(false)
    }

    fn select_and_read(&mut self) -> RawRead {
        self.reads_served += 1;
        self.reads.pop_front().unwrap_or(RawRead {
            status: ReadStatus::HardFail(Self::UNSCRIPTED_READ_STATUS),
            raw: RawIdentifier::default(),
            signature: 0,
        })
    }

    fn firmware_version(&self) -> Option<u8> {
        Some(0x92)
    }
}
