use anyhow::{Context, Result};
use log::{error, info, warn};
use serde::Serialize;

use crate::audio::AudioClip;
use crate::audio::segment::{SEGMENT_MIME, export_segments, plan_segments};
use crate::gemini::GeminiClient;
use crate::workspace::JobWorkspace;

/// Outcome of one segment: its position in the clip and either transcript
/// text or the error that prevented it.
#[derive(Debug, Serialize)]
pub struct SegmentReport {
    pub index: usize,
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug)]
pub struct JobOutput {
    pub transcript: String,
    pub segments: Vec<SegmentReport>,
}

/// Runs a full transcription job inside the given workspace: slices the clip
/// into segments, transcribes them one at a time in order, assembles the
/// joined transcript and persists it as `transcription.txt`.
///
/// A segment that fails to transcribe is reported and contributes an empty
/// line; the remaining segments still run. Only infrastructure problems
/// (exporting segments, writing the transcript) abort the job.
pub async fn run_transcription_job(
    client: &GeminiClient,
    workspace: &JobWorkspace,
    clip: AudioClip,
    segment_length_ms: u64,
) -> Result<JobOutput> {
    let spans = plan_segments(clip.duration_ms(), segment_length_ms);
    let files = export_segments(&clip, &spans, workspace)?;
    drop(clip);

    let total = files.len();
    let mut segments = Vec::with_capacity(total);
    for file in &files {
        info!(
            "transcribing segment {}/{} ({}ms..{}ms)",
            file.span.index + 1,
            total,
            file.span.start_ms,
            file.span.end_ms
        );
        let mut report = SegmentReport {
            index: file.span.index,
            start_ms: file.span.start_ms,
            end_ms: file.span.end_ms,
            text: String::new(),
            error: None,
        };
        match client.transcribe_segment(&file.path, SEGMENT_MIME).await {
            Ok(text) => report.text = text,
            Err(err) => {
                error!("segment {} failed: {err:#}", file.span.index);
                report.error = Some(format!("{err:#}"));
            }
        }
        segments.push(report);
    }

    let transcript = assemble_transcript(&segments);
    tokio::fs::write(workspace.transcript_path(), &transcript)
        .await
        .context("failed to persist transcript")?;
    // The job is done once the transcript is on disk; leftover intermediates
    // are only worth a warning.
    if let Err(err) = workspace.discard_intermediates() {
        warn!("failed to discard intermediate files: {err:#}");
    }

    Ok(JobOutput {
        transcript,
        segments,
    })
}

/// Joins segment texts in order, one newline after each. Failed segments
/// contribute their empty text, which keeps a visible blank line where
/// speech is missing.
fn assemble_transcript(segments: &[SegmentReport]) -> String {
    let mut out = String::new();
    for segment in segments {
        out.push_str(&segment.text);
        out.push('\n');
    }
    out
}
