//! Real-time mixing engine
//!
//! Owned by the audio callback. Mixes the six stem buffers at a shared
//! fractional playhead (linear-interpolated reads give variable playback
//! rate), plus a click voice for the metronome. State flows back to the
//! control thread through relaxed atomics: position, playing flag, and a
//! finished latch the transport polls for the end-of-song event.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::click::{ClickKind, ClickSynth};
use crate::types::{Stem, StereoBuffer, StereoSample, NUM_STEMS};

/// Click gain ramp length; long enough to avoid pops on volume changes
const CLICK_GAIN_RAMP_SECONDS: f32 = 0.010;

/// Lock-free engine state readable from the control thread
pub struct EngineAtomics {
    /// Playhead position in frames (truncated)
    position: AtomicU64,
    /// Total length of the longest loaded stem, in frames
    duration_frames: AtomicU64,
    playing: AtomicBool,
    /// Latched when the playhead runs past the end; cleared by the reader
    finished: AtomicBool,
}

impl EngineAtomics {
    fn new() -> Self {
        Self {
            position: AtomicU64::new(0),
            duration_frames: AtomicU64::new(0),
            playing: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }
    }

    /// Current playback time in seconds
    pub fn position_seconds(&self, sample_rate: u32) -> f64 {
        self.position.load(Ordering::Relaxed) as f64 / sample_rate as f64
    }

    /// Total duration in seconds
    pub fn duration_seconds(&self, sample_rate: u32) -> f64 {
        self.duration_frames.load(Ordering::Relaxed) as f64 / sample_rate as f64
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    /// Consume the finished latch
    pub fn take_finished(&self) -> bool {
        self.finished.swap(false, Ordering::Relaxed)
    }
}

/// Active click playback state
struct ClickVoice {
    kind: ClickKind,
    offset: usize,
}

/// The mixing engine
pub struct PlaybackEngine {
    sample_rate: u32,
    stems: [Option<StereoBuffer>; NUM_STEMS],
    gains: [f32; NUM_STEMS],
    /// Fractional playhead in frames
    playhead: f64,
    rate: f64,
    playing: bool,
    duration_frames: u64,
    synth: ClickSynth,
    click: Option<ClickVoice>,
    click_gain: f32,
    click_gain_target: f32,
    atomics: Arc<EngineAtomics>,
}

impl PlaybackEngine {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            stems: Default::default(),
            gains: [1.0; NUM_STEMS],
            playhead: 0.0,
            rate: 1.0,
            playing: false,
            duration_frames: 0,
            synth: ClickSynth::new(sample_rate),
            click: None,
            click_gain: 0.7,
            click_gain_target: 0.7,
            atomics: Arc::new(EngineAtomics::new()),
        }
    }

    /// Shared handle to the lock-free state
    pub fn atomics(&self) -> Arc<EngineAtomics> {
        self.atomics.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Drain and apply all pending commands
    pub fn process_commands(&mut self, consumer: &mut rtrb::Consumer<super::EngineCommand>) {
        use super::EngineCommand;

        while let Ok(command) = consumer.pop() {
            match command {
                EngineCommand::LoadStem { stem, buffer } => self.load_stem(stem, *buffer),
                EngineCommand::Play => {
                    self.playing = true;
                    self.atomics.playing.store(true, Ordering::Relaxed);
                }
                EngineCommand::Pause => {
                    self.playing = false;
                    self.atomics.playing.store(false, Ordering::Relaxed);
                }
                EngineCommand::Seek { fraction } => self.seek_fraction(fraction),
                EngineCommand::SetStemGain { stem, gain } => {
                    self.gains[stem as usize] = gain.clamp(0.0, 1.0);
                }
                EngineCommand::SetRate { rate } => {
                    if rate > 0.0 {
                        self.rate = rate;
                    }
                }
                EngineCommand::Click { kind } => {
                    self.click = Some(ClickVoice { kind, offset: 0 });
                }
                EngineCommand::SetClickGain { gain } => {
                    self.click_gain_target = gain.clamp(0.0, 1.0);
                }
            }
        }
    }

    fn load_stem(&mut self, stem: Stem, buffer: StereoBuffer) {
        let frames = buffer.len() as u64;
        self.stems[stem as usize] = Some(buffer);
        self.duration_frames = self.duration_frames.max(frames);
        self.atomics
            .duration_frames
            .store(self.duration_frames, Ordering::Relaxed);
    }

    fn seek_fraction(&mut self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        self.playhead = fraction * self.duration_frames as f64;
        self.atomics
            .position
            .store(self.playhead as u64, Ordering::Relaxed);
        self.atomics.finished.store(false, Ordering::Relaxed);
    }

    /// Render one buffer of output
    pub fn process(&mut self, out: &mut [StereoSample]) {
        let ramp_step = 1.0 / (CLICK_GAIN_RAMP_SECONDS * self.sample_rate as f32);

        for frame in out.iter_mut() {
            let mut mixed = StereoSample::silence();

            if self.playing {
                for (idx, stem) in self.stems.iter().enumerate() {
                    let gain = self.gains[idx];
                    if gain <= 0.0 {
                        continue;
                    }
                    if let Some(buffer) = stem {
                        mixed += read_interpolated(buffer, self.playhead) * gain;
                    }
                }

                self.playhead += self.rate;
                if self.playhead >= self.duration_frames as f64 {
                    self.playhead = self.duration_frames as f64;
                    self.playing = false;
                    self.atomics.playing.store(false, Ordering::Relaxed);
                    self.atomics.finished.store(true, Ordering::Relaxed);
                }
            }

            // Click gain ramps toward its target one step per frame
            let delta = self.click_gain_target - self.click_gain;
            if delta.abs() <= ramp_step {
                self.click_gain = self.click_gain_target;
            } else {
                self.click_gain += ramp_step * delta.signum();
            }

            if let Some(voice) = &mut self.click {
                let samples = self.synth.buffer(voice.kind);
                if voice.offset < samples.len() {
                    mixed += StereoSample::mono(samples[voice.offset] * self.click_gain);
                    voice.offset += 1;
                } else {
                    self.click = None;
                }
            }

            *frame = mixed;
        }

        self.atomics
            .position
            .store(self.playhead as u64, Ordering::Relaxed);
    }
}

/// Linear-interpolated stereo read at a fractional frame position
fn read_interpolated(buffer: &StereoBuffer, position: f64) -> StereoSample {
    if buffer.is_empty() || position < 0.0 {
        return StereoSample::silence();
    }
    let index = position as usize;
    if index >= buffer.len() {
        return StereoSample::silence();
    }
    let frac = (position - index as f64) as f32;
    let a = buffer[index];
    let b = if index + 1 < buffer.len() {
        buffer[index + 1]
    } else {
        StereoSample::silence()
    };
    a * (1.0 - frac) + b * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{command_channel, EngineCommand};

    fn constant_buffer(frames: usize, value: f32) -> StereoBuffer {
        let mut buffer = StereoBuffer::silence(frames);
        for i in 0..frames {
            buffer[i] = StereoSample::mono(value);
        }
        buffer
    }

    fn drive(engine: &mut PlaybackEngine, frames: usize) -> StereoBuffer {
        let mut out = StereoBuffer::silence(frames);
        engine.process(out.as_mut_slice());
        out
    }

    #[test]
    fn test_mixes_stems_with_gains() {
        let (mut producer, mut rx) = command_channel();
        let mut engine = PlaybackEngine::new(44100);

        producer
            .push(EngineCommand::LoadStem {
                stem: Stem::Drums,
                buffer: Box::new(constant_buffer(1000, 0.5)),
            })
            .ok();
        producer
            .push(EngineCommand::LoadStem {
                stem: Stem::Bass,
                buffer: Box::new(constant_buffer(1000, 0.25)),
            })
            .ok();
        producer
            .push(EngineCommand::SetStemGain { stem: Stem::Bass, gain: 0.0 })
            .ok();
        producer.push(EngineCommand::SetClickGain { gain: 0.0 }).ok();
        producer.push(EngineCommand::Play).ok();

        engine.process_commands(&mut rx);
        let out = drive(&mut engine, 16);

        // Drums at gain 1.0, bass silenced
        assert!((out[0].left - 0.5).abs() < 1e-6);
        assert!((out[15].right - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_paused_engine_outputs_silence() {
        let (mut tx, mut rx) = command_channel();
        let mut engine = PlaybackEngine::new(44100);

        tx.push(EngineCommand::LoadStem {
            stem: Stem::Drums,
            buffer: Box::new(constant_buffer(1000, 0.5)),
        })
        .ok();
        engine.process_commands(&mut rx);

        let out = drive(&mut engine, 8);
        assert_eq!(out.peak(), 0.0);
        assert_eq!(engine.atomics().position_seconds(44100), 0.0);
    }

    #[test]
    fn test_varispeed_advances_playhead() {
        let (mut tx, mut rx) = command_channel();
        let mut engine = PlaybackEngine::new(44100);

        tx.push(EngineCommand::LoadStem {
            stem: Stem::Drums,
            buffer: Box::new(constant_buffer(44100, 0.5)),
        })
        .ok();
        tx.push(EngineCommand::SetRate { rate: 2.0 }).ok();
        tx.push(EngineCommand::Play).ok();
        engine.process_commands(&mut rx);

        drive(&mut engine, 100);
        let atomics = engine.atomics();
        assert_eq!(atomics.position.load(Ordering::Relaxed), 200);
    }

    #[test]
    fn test_seek_and_finish_latch() {
        let (mut tx, mut rx) = command_channel();
        let mut engine = PlaybackEngine::new(44100);
        let atomics = engine.atomics();

        tx.push(EngineCommand::LoadStem {
            stem: Stem::Vocals,
            buffer: Box::new(constant_buffer(1000, 0.3)),
        })
        .ok();
        tx.push(EngineCommand::Seek { fraction: 0.9 }).ok();
        tx.push(EngineCommand::Play).ok();
        engine.process_commands(&mut rx);

        assert_eq!(atomics.position.load(Ordering::Relaxed), 900);

        // 100 frames left; render more than that
        drive(&mut engine, 200);
        assert!(atomics.take_finished());
        assert!(!atomics.is_playing());
        assert!(!atomics.take_finished(), "latch must clear on read");
    }

    #[test]
    fn test_click_voice_renders_with_ramped_gain() {
        let (mut tx, mut rx) = command_channel();
        let mut engine = PlaybackEngine::new(44100);

        tx.push(EngineCommand::SetClickGain { gain: 1.0 }).ok();
        tx.push(EngineCommand::Click { kind: ClickKind::Strong }).ok();
        engine.process_commands(&mut rx);

        // Click is audible even while transport is paused
        let out = drive(&mut engine, 2000);
        assert!(out.peak() > 0.05);

        // Voice ends; output falls back to silence
        let tail = drive(&mut engine, 64);
        assert_eq!(tail.peak(), 0.0);
    }

    #[test]
    fn test_interpolated_read_midpoint() {
        let mut buffer = StereoBuffer::silence(2);
        buffer[0] = StereoSample::mono(0.0);
        buffer[1] = StereoSample::mono(1.0);

        let mid = read_interpolated(&buffer, 0.5);
        assert!((mid.left - 0.5).abs() < 1e-6);
        assert_eq!(read_interpolated(&buffer, 5.0), StereoSample::silence());
    }
}
