use anyhow::{Context, Result};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::{Path, PathBuf};

use super::{AudioClip, TARGET_SAMPLE_RATE};
use crate::workspace::JobWorkspace;

/// MIME type reported to the transcription API for exported segments.
pub const SEGMENT_MIME: &str = "audio/wav";

const SAMPLES_PER_MS: u64 = TARGET_SAMPLE_RATE as u64 / 1000;

/// One planned slice of the clip, in milliseconds from the start.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegmentSpan {
    pub index: usize,
    pub start_ms: u64,
    pub end_ms: u64,
}

impl SegmentSpan {
    pub fn length_ms(&self) -> u64 {
        self.end_ms - self.start_ms
    }
}

/// A span exported to disk, ready for upload.
#[derive(Debug)]
pub struct SegmentFile {
    pub span: SegmentSpan,
    pub path: PathBuf,
}

/// Splits a clip of `duration_ms` into back-to-back spans of at most
/// `segment_length_ms`. Only the final span may be shorter. An empty clip
/// still yields one zero-length span, so every job produces at least one
/// transcript line.
pub fn plan_segments(duration_ms: u64, segment_length_ms: u64) -> Vec<SegmentSpan> {
    debug_assert!(segment_length_ms > 0);
    if duration_ms == 0 {
        return vec![SegmentSpan {
            index: 0,
            start_ms: 0,
            end_ms: 0,
        }];
    }

    let count = duration_ms.div_ceil(segment_length_ms);
    (0..count)
        .map(|i| SegmentSpan {
            index: i as usize,
            start_ms: i * segment_length_ms,
            end_ms: ((i + 1) * segment_length_ms).min(duration_ms),
        })
        .collect()
}

/// Writes each span as a mono 16-bit WAV file into the job workspace.
pub fn export_segments(
    clip: &AudioClip,
    spans: &[SegmentSpan],
    workspace: &JobWorkspace,
) -> Result<Vec<SegmentFile>> {
    let samples = clip.samples();
    let mut files = Vec::with_capacity(spans.len());

    for span in spans {
        let start = (span.start_ms * SAMPLES_PER_MS) as usize;
        let start = start.min(samples.len());
        // The last span also picks up the sub-millisecond tail the duration
        // rounding dropped.
        let end = if span.index == spans.len() - 1 {
            samples.len()
        } else {
            ((span.end_ms * SAMPLES_PER_MS) as usize).min(samples.len())
        };

        let path = workspace.segment_path(span.index);
        write_wav(&path, &samples[start..end])
            .with_context(|| format!("failed to write segment {}", span.index))?;
        files.push(SegmentFile { span: *span, path });
    }

    Ok(files)
}

fn write_wav(path: &Path, samples: &[f32]) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: TARGET_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample((sample * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}
