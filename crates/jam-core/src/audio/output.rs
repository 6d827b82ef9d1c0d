//! CPAL output stream
//!
//! Builds the output stream that owns the mixing engine. The callback
//! drains the command queue, renders into a scratch buffer, and copies the
//! frames out interleaved, padding extra channels with silence. Dropping
//! the [`AudioSystem`] stops the stream.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream, StreamConfig};
use log::{error, info};

use super::command::{command_channel, CommandSender, EngineCommand};
use super::engine::{EngineAtomics, PlaybackEngine};
use crate::error::{PlayerError, PlayerResult};
use crate::transport::OutputContext;
use crate::types::StereoBuffer;

/// Everything the callback owns, behind one lock the control thread never
/// takes after startup
struct CallbackState {
    engine: PlaybackEngine,
    commands: rtrb::Consumer<EngineCommand>,
    scratch: StereoBuffer,
}

/// Live audio output
///
/// The stream starts suspended; [`OutputContext::resume`] starts it on the
/// first play gesture. Keeps the stream alive; drop to stop audio.
pub struct AudioSystem {
    stream: Stream,
    suspended: bool,
    sender: CommandSender,
    atomics: Arc<EngineAtomics>,
    sample_rate: u32,
}

impl AudioSystem {
    /// Open the default output device and build the engine stream
    pub fn start() -> PlayerResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlayerError::OutputError("no output device available".to_string()))?;

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio device: {}", device_name);

        let supported = preferred_output_config(&device)?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        let config = StreamConfig {
            channels: supported.channels(),
            sample_rate: supported.sample_rate(),
            buffer_size: cpal::BufferSize::Default,
        };

        info!("Audio config: {} channels, {}Hz", channels, sample_rate);

        let engine = PlaybackEngine::new(sample_rate);
        let atomics = engine.atomics();
        let (producer, consumer) = command_channel();

        let state = Arc::new(Mutex::new(CallbackState {
            engine,
            commands: consumer,
            scratch: StereoBuffer::silence(0),
        }));

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                    let mut state = state.lock().unwrap();
                    let n_frames = data.len() / channels;

                    if state.scratch.len() != n_frames {
                        state.scratch = StereoBuffer::silence(n_frames);
                    }

                    let CallbackState { engine, commands, scratch } = &mut *state;
                    engine.process_commands(commands);
                    engine.process(scratch.as_mut_slice());

                    for (i, frame) in data.chunks_mut(channels).enumerate() {
                        let sample = scratch[i];
                        frame[0] = sample.left;
                        if channels > 1 {
                            frame[1] = sample.right;
                        }
                        for ch in frame.iter_mut().skip(2) {
                            *ch = 0.0;
                        }
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| PlayerError::OutputError(e.to_string()))?;

        Ok(Self {
            stream,
            suspended: true,
            sender: CommandSender::new(producer),
            atomics,
            sample_rate,
        })
    }

    /// Control-thread handle to the command queue
    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    /// Lock-free engine state (position, playing, finished latch)
    pub fn atomics(&self) -> Arc<EngineAtomics> {
        self.atomics.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl OutputContext for AudioSystem {
    fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn resume(&mut self) {
        match self.stream.play() {
            Ok(()) => self.suspended = false,
            Err(e) => error!("Failed to resume audio stream: {}", e),
        }
    }
}

/// Pick an f32 stereo config at the device's default rate, falling back to
/// whatever the device offers
fn preferred_output_config(
    device: &cpal::Device,
) -> PlayerResult<cpal::SupportedStreamConfig> {
    let default = device
        .default_output_config()
        .map_err(|e| PlayerError::OutputError(e.to_string()))?;

    if default.sample_format() == SampleFormat::F32 && default.channels() >= 2 {
        return Ok(default);
    }

    let candidate = device
        .supported_output_configs()
        .map_err(|e| PlayerError::OutputError(e.to_string()))?
        .find(|c| c.sample_format() == SampleFormat::F32 && c.channels() >= 2)
        .map(|c| c.with_max_sample_rate());

    Ok(candidate.unwrap_or(default))
}
