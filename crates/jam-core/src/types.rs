//! Common types for the JustJam playback core
//!
//! Fundamental audio types shared by the transport, the metronome and the
//! mixdown renderer: the stem identifiers and the stereo sample/buffer
//! types used for decoded audio.

use std::ops::{Index, IndexMut};

/// Default sample rate for synthesized clicks and offline mixdown.
/// Decoded stems carry their own rate; the output stream negotiates its own.
pub const SAMPLE_RATE: u32 = 44100;

/// Number of instrument stems produced by source separation
pub const NUM_STEMS: usize = 6;

/// Audio sample type (32-bit float for processing)
pub type Sample = f32;

/// Stem identifiers
///
/// One per instrument produced by the separation backend. The name is the
/// wire identifier used in stem maps and mixdown requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum Stem {
    Vocals = 0,
    Bass = 1,
    Drums = 2,
    Guitar = 3,
    Piano = 4,
    Other = 5,
}

impl Stem {
    /// All stems in canonical order
    pub const ALL: [Stem; NUM_STEMS] = [
        Stem::Vocals,
        Stem::Bass,
        Stem::Drums,
        Stem::Guitar,
        Stem::Piano,
        Stem::Other,
    ];

    /// Convert from index (0-5) to Stem
    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }

    /// Wire name of this stem (lowercase, as used in stem maps)
    pub fn name(&self) -> &'static str {
        match self {
            Stem::Vocals => "vocals",
            Stem::Bass => "bass",
            Stem::Drums => "drums",
            Stem::Guitar => "guitar",
            Stem::Piano => "piano",
            Stem::Other => "other",
        }
    }

    /// Parse a wire name back into a stem
    pub fn from_name(name: &str) -> Option<Self> {
        Stem::ALL.iter().copied().find(|s| s.name() == name)
    }
}

/// A single stereo sample (left and right channels)
///
/// `#[repr(C)]` guarantees the [left, right] layout, which lets
/// `&[StereoSample]` be reinterpreted as interleaved `&[f32]` with bytemuck
/// when copying into the output device buffer.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    /// A silent stereo sample
    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// A mono sample (same value in both channels)
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    /// Peak amplitude (max of abs(left), abs(right))
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

impl std::ops::Add for StereoSample {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            left: self.left + other.left,
            right: self.right + other.right,
        }
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}

impl std::ops::MulAssign<Sample> for StereoSample {
    #[inline]
    fn mul_assign(&mut self, factor: Sample) {
        self.left *= factor;
        self.right *= factor;
    }
}

/// A buffer of stereo samples
///
/// Primary container for decoded stem audio and for the offline mixdown.
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Create a buffer with the given capacity (in stereo frames)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    /// Create a buffer filled with silence
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    /// Build a buffer from separate left and right channel slices
    pub fn from_channels(left: &[Sample], right: &[Sample]) -> Self {
        assert_eq!(left.len(), right.len(), "Channel lengths must match");
        let samples = left
            .iter()
            .zip(right.iter())
            .map(|(&l, &r)| StereoSample::new(l, r))
            .collect();
        Self { samples }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Fill the buffer with silence
    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    #[inline]
    pub fn push(&mut self, sample: StereoSample) {
        self.samples.push(sample);
    }

    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }

    /// Zero-copy view as interleaved f32 [L, R, L, R, ...]
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.samples)
    }

    /// Peak amplitude across the whole buffer
    pub fn peak(&self) -> Sample {
        self.samples.iter().map(|s| s.peak()).fold(0.0, Sample::max)
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}
