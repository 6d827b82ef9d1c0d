//! Mix/export bridge
//!
//! Translates the session's per-track volume/mute/solo state plus the
//! metronome settings into a deterministic mixdown request, and renders it
//! through a [`MixRenderer`]. The bundled renderer mixes the decoded stems
//! offline and writes a 16-bit WAV; a remote render service would implement
//! the same trait.
//!
//! Rendering runs on a worker thread; progress flows back to the caller
//! over an mpsc channel:
//!
//! Started → Complete { path } / Failed { error } / Cancelled

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::thread;

use log::{error, info};
use serde::Serialize;

use crate::click::{ClickKind, ClickSynth};
use crate::error::{PlayerError, PlayerResult};
use crate::transport::TrackStatus;
use crate::types::{Stem, StereoBuffer, StereoSample};

/// Mixdown request handed to the render backend
///
/// Field names are the wire format; `volumes` maps stem names to the
/// effective export volume.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MixdownRequest {
    pub volumes: BTreeMap<String, f32>,
    pub bpm: f64,
    /// Click volume; 0.0 when the metronome is disabled
    pub metronome: f32,
    pub start_offset: f64,
}

impl MixdownRequest {
    /// Build the request from current session state
    ///
    /// Solo wins over everything: with any solo active, only soloed tracks
    /// keep their volume. Otherwise muted tracks export at 0 and the rest
    /// at their stored volume. Every registered track appears in the map.
    pub fn from_state(
        tracks: &[TrackStatus],
        bpm: f64,
        metronome_enabled: bool,
        metronome_volume: f32,
        start_offset: f64,
    ) -> Self {
        let any_solo = tracks.iter().any(|t| t.solo);
        let volumes = tracks
            .iter()
            .map(|t| {
                let volume = if any_solo {
                    if t.solo {
                        t.volume
                    } else {
                        0.0
                    }
                } else if t.muted {
                    0.0
                } else {
                    t.volume
                };
                (t.stem.name().to_string(), volume)
            })
            .collect();

        Self {
            volumes,
            bpm,
            metronome: if metronome_enabled { metronome_volume } else { 0.0 },
            start_offset,
        }
    }
}

/// Progress messages for a mixdown, sent from the worker to the caller
#[derive(Debug, Clone)]
pub enum MixProgress {
    /// Rendering started
    Started,
    /// The mix was written
    Complete { path: PathBuf },
    /// Rendering failed; the operation can be retried
    Failed { error: String },
    /// Mixdown was cancelled by the user
    Cancelled,
}

impl MixProgress {
    /// Human-readable description of this progress message
    pub fn description(&self) -> String {
        match self {
            Self::Started => "Rendering mix...".to_string(),
            Self::Complete { path } => format!("Mix written to {}", path.display()),
            Self::Failed { error } => format!("Mixdown failed: {}", error),
            Self::Cancelled => "Mixdown cancelled".to_string(),
        }
    }

    /// Check if this is a terminal message
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started)
    }
}

/// Render backend seam
///
/// `cancel` is polled at checkpoints; a cancelled render returns without
/// producing output and the service reports [`MixProgress::Cancelled`].
pub trait MixRenderer {
    fn render(&self, request: &MixdownRequest, cancel: &AtomicBool) -> PlayerResult<PathBuf>;
}

/// Offline renderer: sums the decoded stems per the request volumes,
/// overlays the synthesized metronome clicks, writes 16-bit stereo WAV
pub struct WavMixRenderer {
    stems: Vec<(Stem, StereoBuffer)>,
    sample_rate: u32,
    output_path: PathBuf,
}

impl WavMixRenderer {
    pub fn new(sample_rate: u32, output_path: impl Into<PathBuf>) -> Self {
        Self {
            stems: Vec::new(),
            sample_rate,
            output_path: output_path.into(),
        }
    }

    /// Register one decoded stem; buffers must share the renderer's rate
    pub fn add_stem(&mut self, stem: Stem, buffer: StereoBuffer) {
        self.stems.push((stem, buffer));
    }

    /// Sum the stems and clicks into one buffer
    fn mix(&self, request: &MixdownRequest, cancel: &AtomicBool) -> Option<StereoBuffer> {
        let frames = self.stems.iter().map(|(_, b)| b.len()).max().unwrap_or(0);
        let mut out = StereoBuffer::silence(frames);

        for (stem, buffer) in &self.stems {
            if cancel.load(Ordering::Relaxed) {
                return None;
            }
            let volume = request.volumes.get(stem.name()).copied().unwrap_or(0.0);
            if volume <= 0.0 {
                continue;
            }
            for (i, &sample) in buffer.as_slice().iter().enumerate() {
                out[i] += sample * volume;
            }
        }

        if request.metronome > 0.0 && request.bpm > 0.0 {
            self.overlay_clicks(&mut out, request);
        }

        Some(out)
    }

    /// Add the click track: strong click on every 4th beat from the offset
    fn overlay_clicks(&self, out: &mut StereoBuffer, request: &MixdownRequest) {
        let synth = ClickSynth::new(self.sample_rate);
        let interval = 60.0 / request.bpm * self.sample_rate as f64;
        let mut beat: u64 = 0;

        loop {
            let start = (request.start_offset * self.sample_rate as f64 + beat as f64 * interval)
                .round() as usize;
            if start >= out.len() {
                break;
            }
            let kind = if beat % 4 == 0 {
                ClickKind::Strong
            } else {
                ClickKind::Weak
            };
            for (i, &s) in synth.buffer(kind).iter().enumerate() {
                let frame = start + i;
                if frame >= out.len() {
                    break;
                }
                out[frame] += StereoSample::mono(s * request.metronome);
            }
            beat += 1;
        }
    }
}

impl MixRenderer for WavMixRenderer {
    fn render(&self, request: &MixdownRequest, cancel: &AtomicBool) -> PlayerResult<PathBuf> {
        let Some(mix) = self.mix(request, cancel) else {
            return Err(PlayerError::MixdownError("cancelled".to_string()));
        };
        if cancel.load(Ordering::Relaxed) {
            return Err(PlayerError::MixdownError("cancelled".to_string()));
        }

        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&self.output_path, spec)
            .map_err(|e| PlayerError::MixdownError(e.to_string()))?;

        for &sample in mix.as_interleaved() {
            let clamped = sample.clamp(-1.0, 1.0);
            writer
                .write_sample((clamped * i16::MAX as f32) as i16)
                .map_err(|e| PlayerError::MixdownError(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| PlayerError::MixdownError(e.to_string()))?;

        Ok(self.output_path.clone())
    }
}

/// Worker-thread mixdown coordinator
///
/// One render at a time; `start` resets the cancellation flag, spawns the
/// worker and returns the progress receiver. Poll the receiver for updates.
pub struct MixdownService {
    cancel_flag: Arc<AtomicBool>,
}

impl MixdownService {
    pub fn new() -> Self {
        Self {
            cancel_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Render the request in the background
    pub fn start<R>(&self, renderer: R, request: MixdownRequest) -> Receiver<MixProgress>
    where
        R: MixRenderer + Send + 'static,
    {
        self.cancel_flag.store(false, Ordering::SeqCst);

        let (progress_tx, progress_rx) = channel();
        let cancel_flag = self.cancel_flag.clone();

        thread::spawn(move || {
            let _ = progress_tx.send(MixProgress::Started);

            match renderer.render(&request, &cancel_flag) {
                Ok(path) => {
                    info!("Mixdown complete: {}", path.display());
                    let _ = progress_tx.send(MixProgress::Complete { path });
                }
                Err(_) if cancel_flag.load(Ordering::Relaxed) => {
                    let _ = progress_tx.send(MixProgress::Cancelled);
                }
                Err(e) => {
                    error!("Mixdown failed: {}", e);
                    let _ = progress_tx.send(MixProgress::Failed {
                        error: e.to_string(),
                    });
                }
            }
        });

        progress_rx
    }

    /// Cancel the current render; the worker stops at its next checkpoint
    pub fn cancel(&self) {
        self.cancel_flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::Relaxed)
    }
}

impl Default for MixdownService {
    fn default() -> Self {
        Self::new()
    }
}
