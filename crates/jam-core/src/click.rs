//! Click sound synthesis for the metronome
//!
//! Generates the two short percussive click buffers (downbeat and offbeat)
//! procedurally at construction time, so no sample assets ship with the
//! player.

use std::f32::consts::TAU;

use crate::types::Sample;

/// Which click to play on a given beat
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickKind {
    /// First beat of the bar
    Strong,
    /// Beats 2-4
    Weak,
}

/// Pre-rendered metronome click buffers
///
/// Both clicks are additive: a fundamental sine plus two harmonics under an
/// exponential decay. The strong click is higher-pitched, slightly longer
/// and decays faster, so the downbeat cuts through the mix. At the maximum
/// supported tempo of 300 BPM the beat interval is 200ms, well above either
/// click length, so consecutive clicks never overlap.
#[derive(Debug, Clone)]
pub struct ClickSynth {
    strong: Vec<Sample>,
    weak: Vec<Sample>,
    sample_rate: u32,
}

impl ClickSynth {
    const STRONG_DURATION_MS: f32 = 30.0;
    const STRONG_FREQ_HZ: f32 = 1000.0;
    const STRONG_DECAY: f32 = 10.0;

    const WEAK_DURATION_MS: f32 = 25.0;
    const WEAK_FREQ_HZ: f32 = 800.0;
    const WEAK_DECAY: f32 = 7.0;

    /// Render both click buffers for the given sample rate
    pub fn new(sample_rate: u32) -> Self {
        Self {
            strong: Self::render(
                sample_rate,
                Self::STRONG_DURATION_MS,
                Self::STRONG_FREQ_HZ,
                Self::STRONG_DECAY,
            ),
            weak: Self::render(
                sample_rate,
                Self::WEAK_DURATION_MS,
                Self::WEAK_FREQ_HZ,
                Self::WEAK_DECAY,
            ),
            sample_rate,
        }
    }

    /// Synthesize one click: fundamental + two harmonics, exponential decay
    fn render(sample_rate: u32, duration_ms: f32, freq: f32, decay: f32) -> Vec<Sample> {
        let num_samples = ((duration_ms / 1000.0) * sample_rate as f32) as usize;
        let mut samples = Vec::with_capacity(num_samples);

        for i in 0..num_samples {
            let t = i as f32 / num_samples as f32;
            let envelope = (-t * decay).exp();

            let phase = i as f32 * TAU * freq / sample_rate as f32;
            // Harmonics at half and quarter amplitude give the click body
            let tone = phase.sin() + 0.5 * (phase * 2.0).sin() + 0.25 * (phase * 3.0).sin();

            samples.push(tone * envelope * 0.5);
        }

        samples
    }

    /// Get the mono samples for a click kind
    pub fn buffer(&self, kind: ClickKind) -> &[Sample] {
        match kind {
            ClickKind::Strong => &self.strong,
            ClickKind::Weak => &self.weak,
        }
    }

    /// Sample rate the buffers were rendered at
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_click_durations() {
        let synth = ClickSynth::new(44100);

        // 30ms and 25ms at 44.1kHz
        assert_eq!(synth.buffer(ClickKind::Strong).len(), 1323);
        assert_eq!(synth.buffer(ClickKind::Weak).len(), 1102);

        // Both fit inside the 200ms beat interval at 300 BPM
        let max_len = (0.2 * 44100.0) as usize;
        assert!(synth.buffer(ClickKind::Strong).len() < max_len);
        assert!(synth.buffer(ClickKind::Weak).len() < max_len);
    }

    #[test]
    fn test_clicks_are_audible_and_distinct() {
        let synth = ClickSynth::new(48000);

        let strong = synth.buffer(ClickKind::Strong);
        let weak = synth.buffer(ClickKind::Weak);

        let peak = |s: &[Sample]| s.iter().map(|x| x.abs()).fold(0.0f32, f32::max);
        assert!(peak(strong) > 0.1);
        assert!(peak(weak) > 0.1);

        // Different fundamentals produce different waveforms
        assert_ne!(&strong[..weak.len().min(strong.len())], &weak[..weak.len().min(strong.len())]);
    }

    #[test]
    fn test_envelope_decays() {
        let synth = ClickSynth::new(44100);
        let strong = synth.buffer(ClickKind::Strong);

        let head_peak = strong[..strong.len() / 4]
            .iter()
            .map(|x| x.abs())
            .fold(0.0f32, f32::max);
        let tail_peak = strong[3 * strong.len() / 4..]
            .iter()
            .map(|x| x.abs())
            .fold(0.0f32, f32::max);

        assert!(tail_peak < head_peak * 0.2);
    }
}
