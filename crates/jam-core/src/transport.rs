//! Multi-track transport
//!
//! Owns one playback handle per loaded stem plus an optional non-audible
//! master waveform handle, and keeps them in lockstep under play/pause/
//! seek/rate changes. The first track to become ready is designated the
//! reference track: its duration is authoritative and its time updates are
//! the single source of `current_time`, fanned out to registered listeners
//! (the metronome's time source among them).
//!
//! The transport is generic over the handle type so the same coordination
//! logic drives both the real audio backend and the mock handles used in
//! tests.

use log::{debug, warn};

use crate::session::LoopRegion;
use crate::types::Stem;

/// Step applied by the arrow-key seek affordance
pub const SEEK_STEP_SECONDS: f64 = 5.0;

/// Master track drift tolerance before a corrective time-set
const MASTER_DRIFT_SECONDS: f64 = 0.1;

/// One stem's playback handle, as the transport sees it
///
/// Implemented by the audio backend's per-stem handle and by the mock
/// handles in tests. All operations are fire-and-forget; position and
/// readiness flow back through events, not through these calls.
pub trait TrackHandle {
    /// Begin or resume playback
    fn play(&mut self);

    /// Pause, keeping position
    fn pause(&mut self);

    /// Jump to a fractional position in [0, 1]
    fn seek_to(&mut self, fraction: f64);

    /// Set the position directly in seconds, without seek side effects
    ///
    /// Used for master-track drift correction so the nudge does not feed
    /// back through seek events.
    fn set_time(&mut self, seconds: f64);

    /// Apply an effective gain in [0, 1]
    fn set_gain(&mut self, gain: f32);

    /// Apply a playback-rate multiplier
    fn set_rate(&mut self, rate: f64);

    /// Duration of the decoded audio in seconds
    fn duration(&self) -> f64;
}

/// Output context that may need resuming before playback can start
///
/// Some platforms suspend the audio output until an explicit user action;
/// `toggle_play` resumes transparently before acting.
pub trait OutputContext {
    fn is_suspended(&self) -> bool;
    fn resume(&mut self);
}

/// Per-track load state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    /// Handle requested, audio not decoded yet
    Loading,
    /// Decoded and controllable
    Ready,
    /// Decode failed; the track stays silent but the rest of the session
    /// remains controllable
    LoadFailed,
}

/// Mix-relevant snapshot of one track, consumed by the export bridge
#[derive(Debug, Clone, Copy)]
pub struct TrackStatus {
    pub stem: Stem,
    pub volume: f32,
    pub muted: bool,
    pub solo: bool,
    pub state: TrackState,
}

struct Track<H> {
    stem: Stem,
    source_url: String,
    volume: f32,
    muted: bool,
    solo: bool,
    state: TrackState,
    handle: Option<H>,
}

/// Effective gain as a pure function of stored state
///
/// Mute always wins; otherwise an active solo elsewhere silences this
/// track; otherwise the stored volume applies. Always recomputed at the
/// moment of application, never cached.
pub fn effective_gain(volume: f32, muted: bool, any_solo: bool, is_solo: bool) -> f32 {
    if muted {
        0.0
    } else if any_solo && !is_solo {
        0.0
    } else {
        volume
    }
}

/// Pick the stem whose waveform stands in for a missing master track:
/// drums, then bass, then the first available stem
pub fn master_fallback_stem(available: &[Stem]) -> Option<Stem> {
    if available.contains(&Stem::Drums) {
        Some(Stem::Drums)
    } else if available.contains(&Stem::Bass) {
        Some(Stem::Bass)
    } else {
        available.first().copied()
    }
}

type TimeListener = Box<dyn FnMut(f64) + Send>;
type SeekListener = Box<dyn FnMut(f64) + Send>;

/// The multi-track transport
pub struct Transport<H: TrackHandle> {
    tracks: Vec<Track<H>>,
    master: Option<H>,
    /// Index of the designated reference track (first to become ready)
    reference: Option<usize>,
    is_playing: bool,
    duration: f64,
    current_time: f64,
    playback_rate: f64,
    loop_region: LoopRegion,
    time_listeners: Vec<TimeListener>,
    seek_listeners: Vec<SeekListener>,
}

impl<H: TrackHandle> Transport<H> {
    pub fn new() -> Self {
        Self {
            tracks: Vec::new(),
            master: None,
            reference: None,
            is_playing: false,
            duration: 0.0,
            current_time: 0.0,
            playback_rate: 1.0,
            loop_region: LoopRegion::new(),
            time_listeners: Vec::new(),
            seek_listeners: Vec::new(),
        }
    }

    /// Register a stem before its audio is decoded
    ///
    /// The track starts in `Loading`; control operations on it are ignored
    /// until [`track_ready`](Self::track_ready) installs a handle.
    pub fn add_track(&mut self, stem: Stem, source_url: impl Into<String>) {
        self.tracks.push(Track {
            stem,
            source_url: source_url.into(),
            volume: 1.0,
            muted: false,
            solo: false,
            state: TrackState::Loading,
            handle: None,
        });
    }

    /// Install the decoded handle for a stem and mark it ready
    ///
    /// The first track to become ready is designated the reference track
    /// and its duration becomes the session duration. The track's stored
    /// volume and the current playback rate are applied immediately.
    pub fn track_ready(&mut self, stem: Stem, mut handle: H) {
        let any_solo = self.any_solo();
        let rate = self.playback_rate;
        let Some(index) = self.tracks.iter().position(|t| t.stem == stem) else {
            warn!("Ready event for unknown stem {:?}", stem);
            return;
        };

        if self.reference.is_none() {
            self.reference = Some(index);
            self.duration = handle.duration();
            debug!(
                "Reference track {:?} ready, duration {:.2}s",
                stem, self.duration
            );
        }

        let track = &mut self.tracks[index];
        handle.set_gain(effective_gain(track.volume, track.muted, any_solo, track.solo));
        handle.set_rate(rate);
        track.handle = Some(handle);
        track.state = TrackState::Ready;
    }

    /// Mark a stem's decode as failed; the rest of the session stays usable
    pub fn track_failed(&mut self, stem: Stem) {
        if let Some(track) = self.tracks.iter_mut().find(|t| t.stem == stem) {
            warn!("Stem {:?} failed to load", stem);
            track.state = TrackState::LoadFailed;
        }
    }

    /// Install the non-audible master waveform handle
    pub fn set_master(&mut self, mut handle: H) {
        handle.set_rate(self.playback_rate);
        self.master = Some(handle);
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn playback_rate(&self) -> f64 {
        self.playback_rate
    }

    /// True once every registered track is ready
    pub fn all_ready(&self) -> bool {
        !self.tracks.is_empty() && self.tracks.iter().all(|t| t.state == TrackState::Ready)
    }

    /// True if any track failed to decode
    pub fn any_failed(&self) -> bool {
        self.tracks.iter().any(|t| t.state == TrackState::LoadFailed)
    }

    pub fn track_state(&self, stem: Stem) -> Option<TrackState> {
        self.tracks.iter().find(|t| t.stem == stem).map(|t| t.state)
    }

    pub fn source_url(&self, stem: Stem) -> Option<&str> {
        self.tracks
            .iter()
            .find(|t| t.stem == stem)
            .map(|t| t.source_url.as_str())
    }

    /// Mix-relevant state of every track, in registration order
    pub fn track_statuses(&self) -> Vec<TrackStatus> {
        self.tracks
            .iter()
            .map(|t| TrackStatus {
                stem: t.stem,
                volume: t.volume,
                muted: t.muted,
                solo: t.solo,
                state: t.state,
            })
            .collect()
    }

    pub fn loop_region(&self) -> &LoopRegion {
        &self.loop_region
    }

    /// Advance the A/B loop marking cycle at the current time
    pub fn cycle_loop(&mut self) {
        self.loop_region.cycle(self.current_time);
    }

    pub fn toggle_loop_enabled(&mut self) {
        self.loop_region.toggle_enabled();
    }

    /// Register a listener for authoritative time updates
    pub fn add_time_listener(&mut self, listener: TimeListener) {
        self.time_listeners.push(listener);
    }

    /// Register a listener fired on every explicit seek (loop wraps
    /// included), used by the host to resync the metronome
    pub fn add_seek_listener(&mut self, listener: SeekListener) {
        self.seek_listeners.push(listener);
    }

    /// Toggle play/pause across every track, resuming the output first if
    /// the platform suspended it
    pub fn toggle_play(&mut self, ctx: &mut dyn OutputContext) {
        if ctx.is_suspended() {
            ctx.resume();
        }

        self.is_playing = !self.is_playing;
        let playing = self.is_playing;
        self.for_each_ready_handle(|handle| {
            if playing {
                handle.play();
            } else {
                handle.pause();
            }
        });
        if let Some(master) = &mut self.master {
            if playing {
                master.play();
            } else {
                master.pause();
            }
        }
    }

    /// Seek every track to the given time, clamped to [0, duration]
    ///
    /// `current_time` updates immediately rather than waiting for the next
    /// natural time update, and seek listeners fire so the metronome can
    /// re-derive its beat counter.
    pub fn seek(&mut self, seconds: f64) {
        let target = seconds.clamp(0.0, self.duration);
        let fraction = if self.duration > 0.0 {
            target / self.duration
        } else {
            0.0
        };

        self.for_each_ready_handle(|handle| handle.seek_to(fraction));
        if let Some(master) = &mut self.master {
            master.set_time(target);
        }

        self.current_time = target;
        for listener in &mut self.seek_listeners {
            listener(target);
        }
    }

    /// Seek relative to the current position (arrow-key affordance)
    pub fn seek_by(&mut self, delta: f64) {
        self.seek(self.current_time + delta);
    }

    /// Store a track volume and apply it through the mute/solo rules
    pub fn set_volume(&mut self, stem: Stem, volume: f32) {
        let volume = volume.clamp(0.0, 1.0);
        if let Some(track) = self.tracks.iter_mut().find(|t| t.stem == stem) {
            track.volume = volume;
        }
        self.apply_gain(stem);
    }

    /// Flip a track's mute flag
    pub fn toggle_mute(&mut self, stem: Stem) {
        if let Some(track) = self.tracks.iter_mut().find(|t| t.stem == stem) {
            track.muted = !track.muted;
        }
        self.apply_gain(stem);
    }

    /// Exclusive solo: soloing a track silences every other track; soloing
    /// it again (or soloing another) replaces the previous solo state
    pub fn toggle_solo(&mut self, stem: Stem) {
        let was_solo = self
            .tracks
            .iter()
            .find(|t| t.stem == stem)
            .map(|t| t.solo)
            .unwrap_or(false);

        for track in &mut self.tracks {
            track.solo = !was_solo && track.stem == stem;
        }
        self.apply_all_gains();
    }

    /// Apply a playback-rate multiplier to every track and the master
    ///
    /// Non-positive rates are rejected; any positive value is accepted even
    /// though the UI offers a discrete set.
    pub fn set_playback_rate(&mut self, rate: f64) {
        if rate <= 0.0 {
            warn!("Ignoring non-positive playback rate {}", rate);
            return;
        }
        self.playback_rate = rate;
        self.for_each_ready_handle(|handle| handle.set_rate(rate));
        if let Some(master) = &mut self.master {
            master.set_rate(rate);
        }
    }

    /// Consume an authoritative time update from the reference track
    ///
    /// Enforces the loop region on every update (not only at natural end)
    /// and fans the time out to registered listeners.
    pub fn handle_time_update(&mut self, seconds: f64) {
        self.current_time = seconds;

        if let Some(target) = self.loop_region.wrap_target(seconds) {
            self.seek(target);
        }

        let t = self.current_time;
        for listener in &mut self.time_listeners {
            listener(t);
        }
    }

    /// Consume the reference track's finish event: wrap to the loop start
    /// if an enabled region exists, otherwise stop
    pub fn handle_finished(&mut self) {
        if self.loop_region.is_enabled() {
            if let Some((start, _)) = self.loop_region.span() {
                self.seek(start);
                self.for_each_ready_handle(|handle| handle.play());
                if let Some(master) = &mut self.master {
                    master.play();
                }
                return;
            }
        }

        self.is_playing = false;
        self.for_each_ready_handle(|handle| handle.pause());
        if let Some(master) = &mut self.master {
            master.pause();
        }
    }

    /// Nudge the master waveform back onto the authoritative clock when it
    /// has drifted past the tolerance
    ///
    /// Uses a direct time-set, not a seek, so the correction cannot feed
    /// back through seek listeners.
    pub fn sync_master(&mut self, master_time: f64) {
        if let Some(master) = &mut self.master {
            if (master_time - self.current_time).abs() > MASTER_DRIFT_SECONDS {
                master.set_time(self.current_time);
            }
        }
    }

    /// Destroy every handle; terminal
    pub fn destroy(&mut self) {
        self.is_playing = false;
        for track in &mut self.tracks {
            track.handle = None;
        }
        self.master = None;
        self.time_listeners.clear();
        self.seek_listeners.clear();
    }

    fn any_solo(&self) -> bool {
        self.tracks.iter().any(|t| t.solo)
    }

    fn apply_gain(&mut self, stem: Stem) {
        let any_solo = self.any_solo();
        if let Some(track) = self.tracks.iter_mut().find(|t| t.stem == stem) {
            if let Some(handle) = &mut track.handle {
                handle.set_gain(effective_gain(track.volume, track.muted, any_solo, track.solo));
            }
        }
    }

    fn apply_all_gains(&mut self) {
        let any_solo = self.any_solo();
        for track in &mut self.tracks {
            if let Some(handle) = &mut track.handle {
                handle.set_gain(effective_gain(track.volume, track.muted, any_solo, track.solo));
            }
        }
    }

    fn for_each_ready_handle(&mut self, mut f: impl FnMut(&mut H)) {
        for track in &mut self.tracks {
            if track.state == TrackState::Ready {
                if let Some(handle) = &mut track.handle {
                    f(handle);
                }
            }
        }
    }
}

impl<H: TrackHandle> Default for Transport<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct HandleLog {
        playing: bool,
        gain: f32,
        rate: f64,
        time: f64,
        seeks: Vec<f64>,
        time_sets: Vec<f64>,
    }

    /// Mock handle recording every call
    #[derive(Clone)]
    struct MockHandle {
        duration: f64,
        log: Arc<Mutex<HandleLog>>,
    }

    impl MockHandle {
        fn new(duration: f64) -> Self {
            Self {
                duration,
                log: Arc::new(Mutex::new(HandleLog::default())),
            }
        }
    }

    impl TrackHandle for MockHandle {
        fn play(&mut self) {
            self.log.lock().unwrap().playing = true;
        }

        fn pause(&mut self) {
            self.log.lock().unwrap().playing = false;
        }

        fn seek_to(&mut self, fraction: f64) {
            self.log.lock().unwrap().seeks.push(fraction);
        }

        fn set_time(&mut self, seconds: f64) {
            let mut log = self.log.lock().unwrap();
            log.time = seconds;
            log.time_sets.push(seconds);
        }

        fn set_gain(&mut self, gain: f32) {
            self.log.lock().unwrap().gain = gain;
        }

        fn set_rate(&mut self, rate: f64) {
            self.log.lock().unwrap().rate = rate;
        }

        fn duration(&self) -> f64 {
            self.duration
        }
    }

    struct MockContext {
        suspended: bool,
        resumed: bool,
    }

    impl OutputContext for MockContext {
        fn is_suspended(&self) -> bool {
            self.suspended
        }

        fn resume(&mut self) {
            self.suspended = false;
            self.resumed = true;
        }
    }

    /// Transport with three ready tracks at volume 0.8
    fn rig() -> (Transport<MockHandle>, [Arc<Mutex<HandleLog>>; 3]) {
        let mut transport = Transport::new();
        let stems = [Stem::Vocals, Stem::Bass, Stem::Drums];
        let mut logs = Vec::new();

        for stem in stems {
            transport.add_track(stem, format!("/stems/{}.wav", stem.name()));
        }
        for stem in stems {
            let handle = MockHandle::new(180.0);
            logs.push(handle.log.clone());
            transport.track_ready(stem, handle);
            transport.set_volume(stem, 0.8);
        }

        (transport, logs.try_into().map_err(|_| ()).unwrap())
    }

    fn gain(log: &Arc<Mutex<HandleLog>>) -> f32 {
        log.lock().unwrap().gain
    }

    #[test]
    fn test_reference_track_sets_duration() {
        let (transport, _) = rig();
        assert_eq!(transport.duration(), 180.0);
        assert!(transport.all_ready());
    }

    #[test]
    fn test_solo_exclusivity() {
        let (mut transport, [vocals, bass, drums]) = rig();

        transport.toggle_solo(Stem::Bass);
        assert_eq!(gain(&vocals), 0.0);
        assert_eq!(gain(&bass), 0.8);
        assert_eq!(gain(&drums), 0.0);

        transport.toggle_solo(Stem::Bass);
        assert_eq!(gain(&vocals), 0.8);
        assert_eq!(gain(&bass), 0.8);
        assert_eq!(gain(&drums), 0.8);
    }

    #[test]
    fn test_solo_moves_between_tracks() {
        let (mut transport, [vocals, bass, drums]) = rig();

        transport.toggle_solo(Stem::Bass);
        transport.toggle_solo(Stem::Drums);
        assert_eq!(gain(&vocals), 0.0);
        assert_eq!(gain(&bass), 0.0);
        assert_eq!(gain(&drums), 0.8);
    }

    #[test]
    fn test_mute_precedence_over_solo() {
        let (mut transport, [vocals, bass, _drums]) = rig();

        transport.toggle_mute(Stem::Vocals);
        assert_eq!(gain(&vocals), 0.0);

        // Soloing the muted track must not unmute it
        transport.toggle_solo(Stem::Vocals);
        assert_eq!(gain(&vocals), 0.0);
        assert_eq!(gain(&bass), 0.0);

        transport.toggle_solo(Stem::Vocals);
        transport.toggle_mute(Stem::Vocals);
        assert_eq!(gain(&vocals), 0.8);
    }

    #[test]
    fn test_volume_change_respects_mute() {
        let (mut transport, [vocals, _, _]) = rig();

        transport.toggle_mute(Stem::Vocals);
        transport.set_volume(Stem::Vocals, 0.5);
        assert_eq!(gain(&vocals), 0.0);

        transport.toggle_mute(Stem::Vocals);
        assert_eq!(gain(&vocals), 0.5);
    }

    #[test]
    fn test_loop_enforced_on_time_update() {
        let (mut transport, _) = rig();
        transport.handle_time_update(10.0);
        transport.cycle_loop();
        transport.handle_time_update(20.0);
        transport.cycle_loop();

        // Not yet enabled
        transport.handle_time_update(20.05);
        assert_eq!(transport.current_time(), 20.05);

        transport.toggle_loop_enabled();
        transport.handle_time_update(20.05);
        assert_eq!(transport.current_time(), 10.0);
    }

    #[test]
    fn test_seek_clamps_and_notifies() {
        let (mut transport, [vocals, _, _]) = rig();
        let seeks = Arc::new(Mutex::new(Vec::new()));
        let seen = seeks.clone();
        transport.add_seek_listener(Box::new(move |t| seen.lock().unwrap().push(t)));

        transport.seek(200.0);
        assert_eq!(transport.current_time(), 180.0);
        assert_eq!(*seeks.lock().unwrap(), vec![180.0]);
        assert_eq!(vocals.lock().unwrap().seeks.last(), Some(&1.0));

        transport.seek(-5.0);
        assert_eq!(transport.current_time(), 0.0);
    }

    #[test]
    fn test_arrow_seek_step() {
        let (mut transport, _) = rig();
        transport.handle_time_update(2.0);
        transport.seek_by(-SEEK_STEP_SECONDS);
        assert_eq!(transport.current_time(), 0.0);
        transport.seek_by(SEEK_STEP_SECONDS);
        assert_eq!(transport.current_time(), 5.0);
    }

    #[test]
    fn test_toggle_play_resumes_suspended_context() {
        let (mut transport, [vocals, _, _]) = rig();
        let mut ctx = MockContext { suspended: true, resumed: false };

        transport.toggle_play(&mut ctx);
        assert!(ctx.resumed);
        assert!(transport.is_playing());
        assert!(vocals.lock().unwrap().playing);

        transport.toggle_play(&mut ctx);
        assert!(!transport.is_playing());
        assert!(!vocals.lock().unwrap().playing);
    }

    #[test]
    fn test_finish_wraps_when_loop_enabled() {
        let (mut transport, [vocals, _, _]) = rig();
        transport.handle_time_update(10.0);
        transport.cycle_loop();
        transport.handle_time_update(20.0);
        transport.cycle_loop();
        transport.toggle_loop_enabled();

        let mut ctx = MockContext { suspended: false, resumed: false };
        transport.toggle_play(&mut ctx);

        transport.handle_finished();
        assert_eq!(transport.current_time(), 10.0);
        assert!(transport.is_playing());
        assert!(vocals.lock().unwrap().playing);
    }

    #[test]
    fn test_finish_stops_without_loop() {
        let (mut transport, [vocals, _, _]) = rig();
        let mut ctx = MockContext { suspended: false, resumed: false };
        transport.toggle_play(&mut ctx);

        transport.handle_finished();
        assert!(!transport.is_playing());
        assert!(!vocals.lock().unwrap().playing);
    }

    #[test]
    fn test_operations_before_ready_are_ignored() {
        let mut transport: Transport<MockHandle> = Transport::new();
        transport.add_track(Stem::Guitar, "/stems/guitar.wav");

        // None of these may panic or take effect
        transport.set_volume(Stem::Guitar, 0.3);
        transport.toggle_mute(Stem::Guitar);
        transport.seek(10.0);
        assert_eq!(transport.duration(), 0.0);
        assert_eq!(transport.current_time(), 0.0);
        assert!(!transport.all_ready());
    }

    #[test]
    fn test_failed_track_leaves_others_controllable() {
        let (mut transport, [vocals, _, _]) = rig();
        transport.add_track(Stem::Guitar, "/stems/guitar.wav");
        transport.track_failed(Stem::Guitar);

        assert!(!transport.all_ready());
        assert!(transport.any_failed());
        assert_eq!(transport.track_state(Stem::Guitar), Some(TrackState::LoadFailed));

        transport.set_volume(Stem::Vocals, 0.4);
        assert_eq!(gain(&vocals), 0.4);
    }

    #[test]
    fn test_rate_fans_out_to_all_tracks_and_master() {
        let (mut transport, [vocals, bass, drums]) = rig();
        let master = MockHandle::new(180.0);
        let master_log = master.log.clone();
        transport.set_master(master);

        transport.set_playback_rate(1.5);
        for log in [&vocals, &bass, &drums, &master_log] {
            assert_eq!(log.lock().unwrap().rate, 1.5);
        }

        transport.set_playback_rate(0.0);
        assert_eq!(transport.playback_rate(), 1.5);
    }

    #[test]
    fn test_master_drift_correction() {
        let (mut transport, _) = rig();
        let master = MockHandle::new(180.0);
        let master_log = master.log.clone();
        transport.set_master(master);

        transport.handle_time_update(50.0);
        transport.sync_master(50.05);
        assert!(master_log.lock().unwrap().time_sets.is_empty());

        transport.sync_master(50.3);
        assert_eq!(master_log.lock().unwrap().time_sets.last(), Some(&50.0));
    }

    #[test]
    fn test_master_fallback_order() {
        assert_eq!(
            master_fallback_stem(&[Stem::Vocals, Stem::Drums, Stem::Bass]),
            Some(Stem::Drums)
        );
        assert_eq!(
            master_fallback_stem(&[Stem::Vocals, Stem::Bass]),
            Some(Stem::Bass)
        );
        assert_eq!(master_fallback_stem(&[Stem::Piano]), Some(Stem::Piano));
        assert_eq!(master_fallback_stem(&[]), None);
    }
}
