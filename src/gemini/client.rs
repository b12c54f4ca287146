use anyhow::{Context, Result, anyhow, bail};
use log::debug;
use std::path::Path;
use std::time::Duration;

use super::dto::{
    Content, FileState, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part,
    StoredFile, UploadResponse, UploadStartFile, UploadStartRequest,
};

/// Instruction sent alongside each audio segment.
pub const TRANSCRIBE_INSTRUCTION: &str =
    "Transcribe this audio as plain text, without identifying the speakers.";

/// How often and how long to poll an uploaded file until it turns ACTIVE.
const ACTIVE_POLL_ATTEMPTS: usize = 20;
const ACTIVE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Client for the Gemini file and generation endpoints.
///
/// A segment is transcribed in three steps: resumable upload of the WAV
/// bytes, a poll until the stored file becomes ACTIVE, then a single
/// `generateContent` call referencing the file.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            http: reqwest::Client::new(),
        }
    }

    /// Uploads one segment and returns its transcript text.
    pub async fn transcribe_segment(&self, path: &Path, mime_type: &str) -> Result<String> {
        let file = self.upload_file(path, mime_type).await?;
        let file = self.wait_until_active(file).await?;
        self.generate_transcript(&file, mime_type).await
    }

    /// Two-step resumable upload: a handshake that yields a session URL,
    /// then a single request carrying all the bytes.
    pub async fn upload_file(&self, path: &Path, mime_type: &str) -> Result<StoredFile> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read segment file {}", path.display()))?;
        let display_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("audio")
            .to_string();

        let start_url = format!("{}/upload/v1beta/files?key={}", self.base_url, self.api_key);
        let response = self
            .http
            .post(&start_url)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len() as u64)
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&UploadStartRequest {
                file: UploadStartFile { display_name },
            })
            .send()
            .await
            .context("failed to reach the file upload endpoint")?;
        let response = check(response, "upload handshake").await?;

        let upload_url = response
            .headers()
            .get("x-goog-upload-url")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("upload handshake returned no session url"))?;

        let response = self
            .http
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await
            .context("failed to send segment bytes")?;
        let response = check(response, "upload").await?;

        let uploaded: UploadResponse = response
            .json()
            .await
            .context("failed to parse upload response")?;
        debug!("uploaded {} as {}", path.display(), uploaded.file.name);
        Ok(uploaded.file)
    }

    /// Polls the stored file until the API reports it ACTIVE. Small WAV
    /// uploads are usually active immediately, so the common case does not
    /// sleep at all. Every fetched state is inspected, the final poll
    /// included, and the wait only gives up after the whole poll budget
    /// came back non-terminal.
    async fn wait_until_active(&self, mut file: StoredFile) -> Result<StoredFile> {
        let mut polls = 0;
        loop {
            match file.state {
                FileState::Active => return Ok(file),
                FileState::Failed => {
                    bail!("uploaded file {} failed server-side processing", file.name)
                }
                _ if polls == ACTIVE_POLL_ATTEMPTS => {
                    bail!(
                        "uploaded file {} never became active after {} polls",
                        file.name,
                        ACTIVE_POLL_ATTEMPTS
                    )
                }
                _ => {
                    tokio::time::sleep(ACTIVE_POLL_INTERVAL).await;
                    file = self.fetch_file(&file.name).await?;
                    polls += 1;
                }
            }
        }
    }

    async fn fetch_file(&self, name: &str) -> Result<StoredFile> {
        let url = format!("{}/v1beta/{}?key={}", self.base_url, name, self.api_key);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .context("failed to poll file state")?;
        let response = check(response, "file state poll").await?;
        response
            .json()
            .await
            .context("failed to parse file state response")
    }

    /// One-shot generation call: the audio file plus the transcription
    /// instruction, with deterministic sampling settings.
    pub async fn generate_transcript(&self, file: &StoredFile, mime_type: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let mime_type = file.mime_type.as_deref().unwrap_or(mime_type);
        let request = GenerateContentRequest {
            contents: vec![
                Content::user(vec![Part::file_reference(&file.uri, mime_type)]),
                Content::user(vec![Part::text(TRANSCRIBE_INSTRUCTION)]),
            ],
            generation_config: GenerationConfig::transcription(),
        };

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("failed to send transcription request")?;
        let response = check(response, "transcription request").await?;

        let body: GenerateContentResponse = response
            .json()
            .await
            .context("failed to parse transcription response")?;
        body.text()
            .ok_or_else(|| anyhow!("model returned no transcript text"))
    }
}

async fn check(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    bail!("{action} returned status {status}: {body}")
}
