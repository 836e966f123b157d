//! Deterministic reader channel for running without reader hardware.
//!
//! Each simulated reader loops through an empty phase followed by a dwell
//! phase. While a tag dwells, the presence probe alternates between `true`
//! and `false` and every third read reports a tolerated timeout, like the
//! clone reader boards in the field. Occasional hard failures are mixed in.
//!
//! Dwells alternate between two tags. The first has UID
//! `04:<select_line>:<reset_line>:5A`, so configuring that as the reader's
//! companion shows all three classifications.

use tagsense_core::{
    ChannelConfig, DriverError, RawRead, ReadStatus, ReaderChannel,
};

/// Probes spent with no tag on the antenna.
const EMPTY_PROBES: u64 = 40;

/// Probes spent with a tag on the antenna.
const DWELL_PROBES: u64 = 60;

/// Every n-th read reports a timeout.
const TIMEOUT_EVERY: u64 = 3;

/// Every n-th read fails outright.
const HARD_FAIL_EVERY: u64 = 17;

/// Driver status code used for simulated hard failures.
const SIMULATED_FAIL_STATUS: u8 = 0x03;

/// UID prefix of the tag that is not the companion.
const FOREIGN_PREFIX: u8 = 0xF0;

/// A [`ReaderChannel`] that replays a fixed presence pattern.
#[derive(Debug, Clone)]
pub struct SimulatedChannel {
    config: ChannelConfig,
    probes: u64,
    reads: u64,
}

impl SimulatedChannel {
    /// UID of the tag that matches a companion configured for these lines.
    #[must_use]
    pub const fn companion_uid(config: &ChannelConfig) -> [u8; 4] {
        [0x04, config.select_line, config.reset_line, 0x5A]
    }

    fn period() -> u64 {
        EMPTY_PROBES + DWELL_PROBES
    }

    fn dwell_index(&self) -> u64 {
        self.probes.saturating_sub(1) / Self::period()
    }

    fn current_uid(&self) -> [u8; 4] {
        let companion = Self::companion_uid(&self.config);
        if self.dwell_index() % 2 == 0 {
            companion
        } else {
            [FOREIGN_PREFIX, companion[1], companion[2], companion[3]]
        }
    }
}

impl ReaderChannel for SimulatedChannel {
    fn open(config: &ChannelConfig) -> Result<Self, DriverError> {
        Ok(Self {
            config: *config,
            probes: 0,
            reads: 0,
        })
    }

    fn initialize(&mut self) -> Result<(), DriverError> {
        self.probes = 0;
        self.reads = 0;
        Ok(())
    }

    fn has_new_presence_event(&mut self) -> bool {
        let position = self.probes % Self::period();
        self.probes += 1;
        position >= EMPTY_PROBES && position % 2 == 0
    }

    fn select_and_read(&mut self) -> RawRead {
        self.reads += 1;
        let read = RawRead::ok(&self.current_uid());
        if self.reads % HARD_FAIL_EVERY == 0 {
            read.with_status(ReadStatus::HardFail(SIMULATED_FAIL_STATUS))
        } else if self.reads % TIMEOUT_EVERY == 0 {
            read.with_status(ReadStatus::ToleratedTimeout)
        } else {
            read
        }
    }

    fn firmware_version(&self) -> Option<u8> {
        // Version byte commonly reported by clone boards.
        Some(0x12)
    }
}
