//! Stem file decoding
//!
//! Decodes one stem file (wav/flac/mp3) into an in-memory [`StereoBuffer`]
//! at the output sample rate. Mono sources are upmixed to both channels;
//! rate mismatches are corrected with a linear resample, which is adequate
//! for practice playback.

use std::fs::File;
use std::path::Path;

use log::{debug, warn};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{PlayerError, PlayerResult};
use crate::types::{Sample, Stem, StereoBuffer, StereoSample};

/// Decode a stem file into a stereo buffer at `target_rate`
pub fn load_stem_file(path: &Path, stem: Stem, target_rate: u32) -> PlayerResult<StereoBuffer> {
    let file = File::open(path)
        .map_err(|e| PlayerError::OpenError(format!("{}: {}", path.display(), e)))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| PlayerError::DecodeError { stem, reason: e.to_string() })?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(PlayerError::DecodeError {
            stem,
            reason: "no decodable audio track".to_string(),
        })?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| PlayerError::DecodeError { stem, reason: e.to_string() })?;

    let mut source_rate = track.codec_params.sample_rate.unwrap_or(target_rate);
    let mut channels = 0usize;
    let mut interleaved: Vec<Sample> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<Sample>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(symphonia::core::errors::Error::ResetRequired) => break,
            Err(e) => {
                return Err(PlayerError::DecodeError { stem, reason: e.to_string() });
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                channels = spec.channels.count();
                source_rate = spec.rate;

                let buf = sample_buf.get_or_insert_with(|| {
                    SampleBuffer::new(decoded.capacity() as u64, spec)
                });
                buf.copy_interleaved_ref(decoded);
                interleaved.extend_from_slice(buf.samples());
            }
            Err(symphonia::core::errors::Error::DecodeError(e)) => {
                // Recoverable; skip the corrupt packet
                warn!("Skipping corrupt packet in {:?}: {}", stem, e);
            }
            Err(e) => {
                return Err(PlayerError::DecodeError { stem, reason: e.to_string() });
            }
        }
    }

    if interleaved.is_empty() || channels == 0 {
        return Err(PlayerError::EmptyStem(stem));
    }

    let buffer = deinterleave(&interleaved, channels);
    if buffer.is_empty() {
        return Err(PlayerError::EmptyStem(stem));
    }
    debug!(
        "Decoded {:?}: {} frames at {}Hz ({} channels)",
        stem,
        buffer.len(),
        source_rate,
        channels
    );

    if source_rate == target_rate {
        Ok(buffer)
    } else {
        Ok(resample_linear(&buffer, source_rate, target_rate))
    }
}

/// Fold interleaved samples down to stereo frames
///
/// Mono is duplicated to both channels; extra channels beyond the first
/// two are ignored.
fn deinterleave(interleaved: &[Sample], channels: usize) -> StereoBuffer {
    let frames = interleaved.len() / channels;
    let mut buffer = StereoBuffer::with_capacity(frames);

    for frame in interleaved.chunks_exact(channels) {
        let left = frame[0];
        let right = if channels > 1 { frame[1] } else { frame[0] };
        buffer.push(StereoSample::new(left, right));
    }

    buffer
}

/// Linear resample to the target rate
fn resample_linear(input: &StereoBuffer, from_rate: u32, to_rate: u32) -> StereoBuffer {
    let ratio = from_rate as f64 / to_rate as f64;
    let out_frames = (input.len() as f64 / ratio).round() as usize;
    let mut out = StereoBuffer::with_capacity(out_frames);

    for i in 0..out_frames {
        let src = i as f64 * ratio;
        let index = src as usize;
        let frac = (src - index as f64) as f32;

        let a = input[index.min(input.len() - 1)];
        let b = input[(index + 1).min(input.len() - 1)];
        out.push(a * (1.0 - frac) + b * frac);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, sample_rate: u32, channels: u16, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let value = ((t * 440.0 * std::f32::consts::TAU).sin() * 0.5 * i16::MAX as f32) as i16;
            for _ in 0..channels {
                writer.write_sample(value).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_decode_stereo_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drums.wav");
        write_wav(&path, 44100, 2, 44100);

        let buffer = load_stem_file(&path, Stem::Drums, 44100).unwrap();
        assert_eq!(buffer.len(), 44100);
        assert!(buffer.peak() > 0.4);
    }

    #[test]
    fn test_mono_upmixes_to_both_channels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bass.wav");
        write_wav(&path, 44100, 1, 1000);

        let buffer = load_stem_file(&path, Stem::Bass, 44100).unwrap();
        assert_eq!(buffer.len(), 1000);
        let frame = buffer[250];
        assert_eq!(frame.left, frame.right);
    }

    #[test]
    fn test_rate_mismatch_is_resampled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("piano.wav");
        write_wav(&path, 22050, 2, 22050);

        let buffer = load_stem_file(&path, Stem::Piano, 44100).unwrap();
        // One second of audio at either rate
        assert!((buffer.len() as i64 - 44100).abs() < 4);
    }

    #[test]
    fn test_missing_file_is_open_error() {
        let result = load_stem_file(Path::new("/no/such/stem.wav"), Stem::Other, 44100);
        assert!(matches!(result, Err(PlayerError::OpenError(_))));
    }

    #[test]
    fn test_garbage_file_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.wav");
        std::fs::write(&path, b"definitely not audio").unwrap();

        let result = load_stem_file(&path, Stem::Guitar, 44100);
        assert!(matches!(result, Err(PlayerError::DecodeError { .. })));
    }
}
