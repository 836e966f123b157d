//! # tagsense-daemon
//!
//! Host process for the tagsense reader array.
//!
//! This library provides the poll loop, shared state, logging setup, and a
//! simulated reader channel for running without hardware.
//!
//! [`state::AppState`] and [`poller::Poller`] are generic over the reader
//! channel. The bundled `tagsense-daemon` binary instantiates them with
//! [`simulation::SimulatedChannel`]; a host for real readers supplies its own
//! `tagsense_core::ReaderChannel` implementation instead.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]

pub mod logging;
pub mod poller;
pub mod simulation;
pub mod state;
