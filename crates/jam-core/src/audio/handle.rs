//! Control-thread handles into the audio engine
//!
//! Adapters that let the generic transport and metronome drive the real
//! backend: each one translates trait calls into engine commands pushed
//! through the shared queue.

use super::command::{CommandSender, EngineCommand};
use crate::click::ClickKind;
use crate::metronome::ClickSink;
use crate::transport::TrackHandle;
use crate::types::Stem;

/// Per-stem transport handle backed by the engine command queue
///
/// Play/pause/seek/rate are engine-wide; the engine applies them once even
/// though the transport fans them out per track. Gain is per stem.
pub struct EngineTrackHandle {
    stem: Stem,
    duration_seconds: f64,
    sender: CommandSender,
}

impl EngineTrackHandle {
    pub fn new(stem: Stem, duration_seconds: f64, sender: CommandSender) -> Self {
        Self {
            stem,
            duration_seconds,
            sender,
        }
    }
}

impl TrackHandle for EngineTrackHandle {
    fn play(&mut self) {
        self.sender.send(EngineCommand::Play);
    }

    fn pause(&mut self) {
        self.sender.send(EngineCommand::Pause);
    }

    fn seek_to(&mut self, fraction: f64) {
        self.sender.send(EngineCommand::Seek { fraction });
    }

    fn set_time(&mut self, seconds: f64) {
        if self.duration_seconds > 0.0 {
            self.sender.send(EngineCommand::Seek {
                fraction: seconds / self.duration_seconds,
            });
        }
    }

    fn set_gain(&mut self, gain: f32) {
        self.sender.send(EngineCommand::SetStemGain {
            stem: self.stem,
            gain,
        });
    }

    fn set_rate(&mut self, rate: f64) {
        self.sender.send(EngineCommand::SetRate { rate });
    }

    fn duration(&self) -> f64 {
        self.duration_seconds
    }
}

/// Metronome click sink backed by the engine's click voice
pub struct EngineClickSink {
    sender: CommandSender,
}

impl EngineClickSink {
    pub fn new(sender: CommandSender) -> Self {
        Self { sender }
    }
}

impl ClickSink for EngineClickSink {
    fn click(&mut self, kind: ClickKind) {
        self.sender.send(EngineCommand::Click { kind });
    }

    fn set_gain(&mut self, gain: f32) {
        self.sender.send(EngineCommand::SetClickGain { gain });
    }
}
