//! Production audio backend
//!
//! A CPAL output stream owns the mixing engine; the control thread talks
//! to it through a lock-free SPSC command queue and reads position/state
//! back through relaxed atomics. Stem files are decoded up front into
//! memory, so the callback never touches the filesystem.

mod command;
mod engine;
mod handle;
mod loader;
mod output;

pub use command::{command_channel, CommandSender, EngineCommand};
pub use engine::{EngineAtomics, PlaybackEngine};
pub use handle::{EngineClickSink, EngineTrackHandle};
pub use loader::load_stem_file;
pub use output::AudioSystem;
