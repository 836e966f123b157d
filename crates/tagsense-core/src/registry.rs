//! Ordered collection of reader sessions with an aggregate state table.
//!
//! Readers are append-only. A reader's [`ReaderId`] is its position in
//! registration order and never changes.
//!
//! The registry has no internal locking. Callers that share it across
//! execution contexts must wrap it in a single lock held around each
//! [`ReaderRegistry::poll_all`] and each aggregate read.

use std::fmt;

use thiserror::Error;
use tracing::{info, info_span};

use crate::classification::Classification;
use crate::config::{DebounceConfig, TagsenseConfig, MAX_READERS};
use crate::driver::{ChannelConfig, DriverError, ReaderChannel};
use crate::identifier::Identifier;
use crate::session::{ReaderId, ReaderSession, Transition, TransitionHandler};

/// Errors raised by registry operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Every one-byte reader ID is taken.
    #[error("Cannot register more than {max} readers")]
    TooManyReaders {
        /// Maximum number of readers.
        max: usize,
    },

    /// No reader has the given ID.
    #[error("Unknown reader {0}")]
    UnknownReader(ReaderId),

    /// The caller's buffer cannot hold one byte per reader.
    #[error("State buffer too small: need {needed} bytes, got {actual}")]
    BufferTooSmall {
        /// Number of readers.
        needed: usize,
        /// Length of the caller's buffer.
        actual: usize,
    },

    /// The reader's channel could not be opened or initialized.
    #[error("Reader setup failed: {0}")]
    Driver(#[from] DriverError),
}

/// Reader sessions plus the last confirmed classification of each.
pub struct ReaderRegistry<C> {
    sessions: Vec<ReaderSession<C>>,
    states: Vec<Classification>,
    debounce: DebounceConfig,
    handler: Option<Box<dyn TransitionHandler>>,
}

impl<C: ReaderChannel> ReaderRegistry<C> {
    /// Create an empty registry whose sessions use `debounce`.
    ///
    /// A zero threshold is raised to [`DebounceConfig::MIN_THRESHOLD`].
    #[must_use]
    pub fn new(debounce: DebounceConfig) -> Self {
        Self {
            sessions: Vec::new(),
            states: Vec::new(),
            debounce: debounce.clamped(),
            handler: None,
        }
    }

    /// Debounce settings handed to each new session.
    #[must_use]
    pub const fn debounce(&self) -> DebounceConfig {
        self.debounce
    }

    /// Build a registry with every reader in `config`, in order.
    ///
    /// # Errors
    ///
    /// Returns the first reader setup failure.
    pub fn from_config(config: &TagsenseConfig) -> Result<Self, RegistryError> {
        let mut registry = Self::new(config.debounce);
        for reader in &config.readers {
            let id = registry.add_reader(reader.channel(), reader.companion)?;
            if let Some(name) = &reader.name {
                info!(reader = %id, name = %name, "Reader labelled");
            }
        }
        Ok(registry)
    }

    /// Open, initialize and register a reader channel.
    ///
    /// A `None` companion registers [`Identifier::ZERO`], so every tag reads
    /// as unknown.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::TooManyReaders`] when all IDs are used, or the
    /// driver error if the channel cannot be brought up.
    pub fn add_reader(
        &mut self,
        channel: ChannelConfig,
        companion: Option<Identifier>,
    ) -> Result<ReaderId, RegistryError> {
        let id = u8::try_from(self.sessions.len())
            .map(ReaderId)
            .map_err(|_| RegistryError::TooManyReaders { max: MAX_READERS })?;

        let companion = companion.unwrap_or(Identifier::ZERO);
        let driver = C::open(&channel)?;
        let session = ReaderSession::new(id, driver, companion, self.debounce)?;

        info!(
            reader = %id,
            select_line = channel.select_line,
            reset_line = channel.reset_line,
            companion = %companion,
            "Reader registered"
        );
        self.sessions.push(session);
        self.states.push(Classification::Absent);
        Ok(id)
    }

    /// Install the caller-level transition handler.
    ///
    /// It runs after the state table has been updated.
    pub fn set_handler(&mut self, handler: impl TransitionHandler + 'static) {
        self.handler = Some(Box::new(handler));
    }

    /// Run one poll cycle on every reader, in registration order.
    ///
    /// Returns the transitions confirmed during this cycle.
    pub fn poll_all(&mut self) -> Vec<Transition> {
        let _span = info_span!("poll_all", readers = self.sessions.len()).entered();

        let mut transitions = Vec::new();
        for session in &mut self.sessions {
            let Some(transition) = session.poll() else {
                continue;
            };
            self.states[transition.reader.index()] = transition.to;
            if let Some(handler) = self.handler.as_mut() {
                handler.on_transition(transition.reader, transition.to);
            }
            transitions.push(transition);
        }

        if !transitions.is_empty() {
            info!(states = %StateRow(&self.states), "Aggregate state");
        }
        transitions
    }

    /// Zero every session's current tag.
    ///
    /// Confirmed classifications and debounce counters are kept.
    pub fn clear_all_caches(&mut self) {
        for session in &mut self.sessions {
            session.clear_uid_cache();
        }
    }
}

impl<C> ReaderRegistry<C> {
    /// Copy one classification code per reader into `out`, indexed by ID.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::BufferTooSmall`] without writing anything if
    /// `out` is shorter than the number of readers.
    pub fn aggregate_state(&self, out: &mut [u8]) -> Result<usize, RegistryError> {
        let needed = self.states.len();
        if out.len() < needed {
            return Err(RegistryError::BufferTooSmall {
                needed,
                actual: out.len(),
            });
        }
        for (slot, state) in out.iter_mut().zip(&self.states) {
            *slot = state.as_code();
        }
        Ok(needed)
    }

    /// Confirmed classification of every reader, indexed by ID.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Classification> {
        self.states.clone()
    }

    /// Confirmed classification of one reader.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownReader`] for an unregistered ID.
    pub fn state_of(&self, id: ReaderId) -> Result<Classification, RegistryError> {
        self.states
            .get(id.index())
            .copied()
            .ok_or(RegistryError::UnknownReader(id))
    }

    /// Number of registered readers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if no reader is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Borrow a session.
    #[must_use]
    pub fn session(&self, id: ReaderId) -> Option<&ReaderSession<C>> {
        self.sessions.get(id.index())
    }

    /// Mutably borrow a session.
    pub fn session_mut(&mut self, id: ReaderId) -> Option<&mut ReaderSession<C>> {
        self.sessions.get_mut(id.index())
    }

    /// Iterate over sessions in registration order.
    pub fn sessions(&self) -> impl Iterator<Item = &ReaderSession<C>> {
        self.sessions.iter()
    }
}

impl<C> fmt::Debug for ReaderRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderRegistry")
            .field("readers", &self.sessions.len())
            .field("states", &self.states)
            .field("debounce", &self.debounce)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

/// Renders states as a compact row of codes, e.g. `201`.
struct StateRow<'a>(&'a [Classification]);

impl fmt::Display for StateRow<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for state in self.0 {
            write!(f, "{}", state.as_code())?;
        }
        Ok(())
    }
}
