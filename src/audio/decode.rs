use anyhow::{Context, Result, anyhow};
use log::warn;
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::{AudioClip, TARGET_SAMPLE_RATE, resample::resample_to_target};

/// Decodes an uploaded file (mp3, wav or m4a) into a mono clip at the
/// target rate. Container and codec are sniffed from the content; the file
/// extension only serves as a probe hint.
pub fn load_clip(path: &Path) -> Result<AudioClip> {
    let file = File::open(path)
        .with_context(|| format!("failed to open audio file {}", path.display()))?;
    let stream = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .context("unrecognized audio container")?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("no audio track found"))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("unsupported audio codec")?;

    let mut samples: Vec<f32> = Vec::new();
    let mut channels = 0usize;
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(err).context("failed to read audio packet"),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(err)) => {
                // Corrupt frames are skipped; the rest of the file may
                // still decode.
                warn!("skipping undecodable packet: {err}");
                continue;
            }
            Err(err) => return Err(err).context("failed to decode audio packet"),
        };

        let spec = *decoded.spec();
        channels = spec.channels.count();
        sample_rate.get_or_insert(spec.rate);

        let buf = sample_buf.get_or_insert_with(|| {
            SampleBuffer::<f32>::new(decoded.capacity() as u64, spec)
        });
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    // A valid container with no frames is an empty clip, not an error.
    if samples.is_empty() {
        return Ok(AudioClip::from_samples(Vec::new()));
    }
    let sample_rate = sample_rate.ok_or_else(|| anyhow!("audio stream has no sample rate"))?;

    let mono = mix_to_mono(&samples, channels);
    let mono = if sample_rate == TARGET_SAMPLE_RATE {
        mono
    } else {
        resample_to_target(&mono, sample_rate)?
    };

    Ok(AudioClip::from_samples(mono))
}

fn mix_to_mono(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};

    fn write_test_wav(path: &Path, sample_rate: u32, channels: u16, frames: usize) {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for frame in 0..frames {
            let value = ((frame % 100) as f32 / 100.0 * i16::MAX as f32) as i16;
            for _ in 0..channels {
                writer.write_sample(value).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn decodes_mono_wav_at_target_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_test_wav(&path, TARGET_SAMPLE_RATE, 1, 16_000);

        let clip = load_clip(&path).unwrap();
        assert_eq!(clip.samples().len(), 16_000);
        assert_eq!(clip.duration_ms(), 1_000);
    }

    #[test]
    fn downmixes_stereo_to_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_test_wav(&path, TARGET_SAMPLE_RATE, 2, 8_000);

        let clip = load_clip(&path).unwrap();
        assert_eq!(clip.samples().len(), 8_000);
    }

    #[test]
    fn resamples_non_target_rates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cd.wav");
        write_test_wav(&path, 44_100, 1, 44_100);

        let clip = load_clip(&path).unwrap();
        // One second of input stays roughly one second after resampling.
        let drift = clip.samples().len().abs_diff(TARGET_SAMPLE_RATE as usize);
        assert!(drift < 200, "unexpected resampled length {}", clip.samples().len());
    }

    #[test]
    fn empty_wav_decodes_to_empty_clip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        write_test_wav(&path, TARGET_SAMPLE_RATE, 1, 0);

        let clip = load_clip(&path).unwrap();
        assert!(clip.samples().is_empty());
        assert_eq!(clip.duration_ms(), 0);
    }

    #[test]
    fn rejects_non_audio_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("not-audio.mp3");
        std::fs::write(&path, b"this is certainly not an mp3 stream").unwrap();

        assert!(load_clip(&path).is_err());
    }

    #[test]
    fn mixdown_averages_channels() {
        let interleaved = [1.0, 0.0, 0.5, 0.5, -1.0, 1.0];
        assert_eq!(mix_to_mono(&interleaved, 2), vec![0.5, 0.5, 0.0]);
        assert_eq!(mix_to_mono(&interleaved, 1), interleaved.to_vec());
    }
}
