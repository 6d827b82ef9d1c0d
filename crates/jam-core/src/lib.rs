//! JustJam Core - playback, metronome and stem-sync engine
//!
//! This crate contains the session engine behind the JustJam multitrack
//! practice player: a set of independently loaded instrument stems kept in
//! lockstep by a transport, a beat-accurate metronome phase-locked to the
//! transport's clock, loop/bookmark/tap-tempo controls, and the mixdown
//! export bridge.

pub mod audio;
pub mod click;
pub mod error;
pub mod export;
pub mod keys;
pub mod metronome;
pub mod session;
pub mod structure;
pub mod transport;
pub mod types;

pub use types::*;
