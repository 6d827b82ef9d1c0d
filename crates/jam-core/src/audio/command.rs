//! Lock-free command queue for the audio engine
//!
//! The control thread sends commands through an SPSC ring buffer; the audio
//! callback drains them at the start of each buffer. No mutex is shared
//! with the callback's hot path, so a busy control thread can never cause
//! an audible dropout.

use std::sync::{Arc, Mutex};

use log::warn;

use crate::click::ClickKind;
use crate::types::{Stem, StereoBuffer};

/// Commands sent from the control thread to the audio callback
///
/// Processed at buffer boundaries, so no state changes mid-buffer. Decoded
/// stem audio is boxed to keep the enum pointer-sized in the queue.
pub enum EngineCommand {
    /// Install a decoded stem buffer
    LoadStem { stem: Stem, buffer: Box<StereoBuffer> },
    /// Start playback of all loaded stems
    Play,
    /// Pause, keeping the playhead
    Pause,
    /// Move the playhead to a fractional position in [0, 1]
    Seek { fraction: f64 },
    /// Set one stem's effective gain
    SetStemGain { stem: Stem, gain: f32 },
    /// Set the playback-rate multiplier for all stems
    SetRate { rate: f64 },
    /// Trigger a metronome click
    Click { kind: ClickKind },
    /// Set the click gain target (ramped by the click voice)
    SetClickGain { gain: f32 },
}

/// Queue capacity; commands are tiny, this covers bursts of UI activity
const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Create the command queue
///
/// Producer side goes to the control thread (wrapped in [`CommandSender`]),
/// consumer side is moved into the audio callback.
pub fn command_channel() -> (rtrb::Producer<EngineCommand>, rtrb::Consumer<EngineCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}

/// Cloneable control-thread handle to the command queue
///
/// The producer itself is single-owner; the mutex lets several track
/// handles on the control thread share it. The audio thread never touches
/// this lock.
#[derive(Clone)]
pub struct CommandSender {
    producer: Arc<Mutex<rtrb::Producer<EngineCommand>>>,
}

impl CommandSender {
    pub fn new(producer: rtrb::Producer<EngineCommand>) -> Self {
        Self {
            producer: Arc::new(Mutex::new(producer)),
        }
    }

    /// Push a command; a full queue drops the command with a warning
    pub fn send(&self, command: EngineCommand) {
        match self.producer.lock() {
            Ok(mut producer) => {
                if producer.push(command).is_err() {
                    warn!("Engine command queue full, command dropped");
                }
            }
            Err(_) => warn!("Engine command queue lock poisoned"),
        }
    }
}
