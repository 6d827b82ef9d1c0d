//! Beat-accurate metronome engine
//!
//! The metronome is phase-locked to an externally supplied playback clock
//! rather than to the audio render thread: each scheduling tick it polls the
//! installed time source, computes which beat index that time implies, and
//! fires the click for that beat exactly once. The host drives `tick()` at
//! its own refresh cadence (UI frame loop, timer thread), so the engine
//! must tolerate coarse and uneven polling intervals.
//!
//! Every external perturbation of the time/beat mapping (tempo change,
//! offset change, seek) is routed through a single `resync()` so the beat
//! counter can never replay already-passed beats or burst-fire a backlog
//! of missed ones.

use crate::click::ClickKind;

/// Metronome tempo range
pub const MIN_BPM: f64 = 30.0;
pub const MAX_BPM: f64 = 300.0;

/// Beat position emitted to the visual callback when no beat is active
/// (stopped, or playback has not reached the start offset yet)
pub const NO_BEAT: i32 = -1;

/// Beats per bar; the strong click lands on beat 0
const BEATS_PER_BAR: i64 = 4;

/// Where the metronome sends its clicks
///
/// The production sink pushes commands into the audio thread's queue, where
/// the click voice applies the gain with a short ramp. Tests use a
/// recording sink.
pub trait ClickSink: Send {
    /// Play one click
    fn click(&mut self, kind: ClickKind);

    /// Update the click gain (0.0 - 1.0)
    ///
    /// Implementations apply this with a ~10ms ramp so live volume changes
    /// don't pop.
    fn set_gain(&mut self, gain: f32);
}

/// Polled playback clock, in seconds
///
/// Returns `None` when no authoritative time is available yet (no track
/// ready); the engine skips the tick silently in that case.
pub type TimeSource = Box<dyn Fn() -> Option<f64> + Send>;

/// Visual beat callback: bar position 0-3, or [`NO_BEAT`]
pub type BeatCallback = Box<dyn FnMut(i32) + Send>;

/// The metronome engine
///
/// `enabled` is the user-facing switch; `running` reflects whether the
/// scheduling loop is live (the host ties it to `is_playing && enabled`).
pub struct Metronome {
    bpm: f64,
    start_offset: f64,
    volume: f32,
    enabled: bool,
    running: bool,
    /// 0-based index of the beat most recently clicked; -1 = reset
    last_scheduled_beat: i64,
    time_source: Option<TimeSource>,
    sink: Option<Box<dyn ClickSink>>,
    on_beat: Option<BeatCallback>,
}

impl Metronome {
    /// Create a metronome feeding the given click sink
    pub fn new(sink: Box<dyn ClickSink>) -> Self {
        Self {
            bpm: 120.0,
            start_offset: 0.0,
            volume: 0.7,
            enabled: true,
            running: false,
            last_scheduled_beat: -1,
            time_source: None,
            sink: Some(sink),
            on_beat: None,
        }
    }

    /// Install the playback clock the engine polls each tick
    pub fn set_time_source(&mut self, source: TimeSource) {
        self.time_source = Some(source);
    }

    /// Register the visual beat callback
    pub fn set_on_beat(&mut self, callback: BeatCallback) {
        self.on_beat = Some(callback);
    }

    /// Set the tempo, clamped to [30, 300] BPM
    ///
    /// While running this re-derives the beat counter so the tempo change
    /// neither replays passed beats nor fires a burst.
    pub fn set_bpm(&mut self, bpm: f64) {
        self.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        if self.running {
            self.resync();
        }
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Set the first-beat offset in seconds (clamped to >= 0)
    pub fn set_start_offset(&mut self, seconds: f64) {
        self.start_offset = seconds.max(0.0);
        if self.running {
            self.resync();
        }
    }

    pub fn start_offset(&self) -> f64 {
        self.start_offset
    }

    /// Set the click volume, clamped to [0, 1]
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(sink) = &mut self.sink {
            sink.set_gain(self.volume);
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Enable or disable the metronome; disabling stops the loop
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled && self.running {
            self.stop();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Begin scheduling
    ///
    /// Seeds the beat counter from the current clock so the next elapsed
    /// beat fires, not the one whose boundary already passed.
    pub fn start(&mut self) {
        if !self.enabled || self.running {
            return;
        }
        self.running = true;
        if let Some(sink) = &mut self.sink {
            sink.set_gain(self.volume);
        }
        self.resync();
    }

    /// Halt scheduling and clear beat tracking
    pub fn stop(&mut self) {
        self.running = false;
        self.last_scheduled_beat = -1;
        self.emit_beat(NO_BEAT);
    }

    /// Re-derive the beat counter after a position jump, without stopping
    ///
    /// Prevents a flood of "missed" clicks right after a seek.
    pub fn seek(&mut self) {
        if self.running {
            self.resync();
        } else {
            self.last_scheduled_beat = -1;
        }
    }

    /// Stop and release the click output
    pub fn destroy(&mut self) {
        self.stop();
        self.sink = None;
        self.time_source = None;
    }

    /// One scheduling tick: poll the clock, fire at most the newest beat
    ///
    /// Called by the host once per frame. A tick that crosses several beat
    /// boundaries (coarse polling, long frame) fires only the current beat;
    /// missed beats are never replayed.
    pub fn tick(&mut self) {
        if !self.running {
            return;
        }
        let Some(t) = self.poll_time() else {
            return;
        };

        if t < self.start_offset {
            if self.last_scheduled_beat != -1 {
                self.last_scheduled_beat = -1;
                self.emit_beat(NO_BEAT);
            }
            return;
        }

        let beat = self.beat_index_at(t);
        if beat > self.last_scheduled_beat {
            let kind = if beat % BEATS_PER_BAR == 0 {
                ClickKind::Strong
            } else {
                ClickKind::Weak
            };
            if let Some(sink) = &mut self.sink {
                sink.click(kind);
            }
            self.emit_beat((beat % BEATS_PER_BAR) as i32);
            self.last_scheduled_beat = beat;
        }
    }

    /// Single reset entry point: align the beat counter with the clock
    ///
    /// Sets the counter one below the next beat boundary at or after the
    /// current time, so the next `tick()` fires that beat and nothing
    /// earlier. A boundary lying exactly on the current time still fires.
    fn resync(&mut self) {
        self.last_scheduled_beat = match self.poll_time() {
            Some(t) if t >= self.start_offset => {
                let interval = 60.0 / self.bpm;
                let elapsed = (t - self.start_offset) / interval;
                elapsed.ceil() as i64 - 1
            }
            _ => -1,
        };
    }

    fn beat_index_at(&self, t: f64) -> i64 {
        let interval = 60.0 / self.bpm;
        ((t - self.start_offset) / interval).floor() as i64
    }

    fn poll_time(&self) -> Option<f64> {
        self.time_source.as_ref().and_then(|source| source())
    }

    fn emit_beat(&mut self, position: i32) {
        if let Some(cb) = &mut self.on_beat {
            cb(position);
        }
    }
}
