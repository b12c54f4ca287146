use actix_cors::Cors;
use actix_multipart::{Field, Multipart};
use actix_web::http::header::{ContentDisposition, ContentType, DispositionParam, DispositionType};
use actix_web::{
    App, HttpRequest, HttpResponse, HttpServer, Responder, get, middleware::Logger, post, web,
};
use futures_util::TryStreamExt;
use log::{debug, error, info, warn};
use std::path::PathBuf;
use uuid::Uuid;

use crate::audio::decode::load_clip;
use crate::config::AppConfig;
use crate::gemini::GeminiClient;
use crate::pipeline::{SegmentReport, run_transcription_job};
use crate::session::{AccessGate, SessionStore, StoredTranscript};
use crate::workspace::{JobWorkspace, TRANSCRIPT_FILE_NAME};

const INDEX_HTML: &str = include_str!("../static/index.html");

/// Header carrying the session token on authenticated requests.
pub const SESSION_TOKEN_HEADER: &str = "X-Session-Token";

const ALLOWED_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a"];

/// Default cap on the buffered upload, enforced while the field is read.
pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

#[derive(serde::Deserialize)]
pub struct SessionRequest {
    pub password: String,
}

#[derive(serde::Serialize)]
pub struct SessionDto {
    pub token: String,
}

#[derive(serde::Serialize)]
pub struct TranscribeDto {
    pub transcript: String,
    pub segments: Vec<SegmentReport>,
    pub failed_segments: Vec<usize>,
    pub download: String,
}

pub struct AppState {
    pub gate: AccessGate,
    pub sessions: SessionStore,
    pub gemini: GeminiClient,
    pub segment_length_ms: u64,
    pub spool_dir: PathBuf,
    pub upload_limit_bytes: usize,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            gate: AccessGate::new(config.password.clone()),
            sessions: SessionStore::new(),
            gemini: GeminiClient::new(
                config.gemini_base_url.as_str(),
                config.gemini_api_key.as_str(),
                config.gemini_model.as_str(),
            ),
            segment_length_ms: config.segment_length_ms,
            spool_dir: config.spool_dir.clone(),
            upload_limit_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

#[get("/")]
pub async fn index() -> impl Responder {
    HttpResponse::Ok()
        .content_type(ContentType::html())
        .body(INDEX_HTML)
}

#[get("/api/v1/health")]
pub async fn health_check() -> impl Responder {
    debug!("Health check endpoint called");
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "message": "Audio transcription service is running"
    }))
}

/// Exchanges the shared password for a session token.
#[post("/api/v1/session")]
pub async fn open_session(
    data: web::Data<AppState>,
    body: web::Json<SessionRequest>,
) -> impl Responder {
    if !data.gate.is_authorized(&body.password) {
        warn!("Rejected session request with wrong password");
        return HttpResponse::Unauthorized().json(serde_json::json!({
            "error": "Incorrect password"
        }));
    }

    let token = data.sessions.open();
    debug!("Opened session {token}");
    HttpResponse::Ok().json(SessionDto {
        token: token.to_string(),
    })
}

/// Receives one audio file, runs the full transcription job and returns the
/// joined transcript along with per-segment details.
#[post("/api/v1/transcribe")]
pub async fn transcribe_upload(
    data: web::Data<AppState>,
    req: HttpRequest,
    mut payload: Multipart,
) -> impl Responder {
    let token = match authorize(&data, &req) {
        Ok(token) => token,
        Err(response) => return response,
    };
    debug!("Transcription request received");

    let mut audio_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;

    // Process multipart fields
    while let Some(field) = payload.try_next().await.unwrap_or(None) {
        match field.name() {
            Some("audio") => {
                file_name = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .map(str::to_string);
                match read_field_data(field, data.upload_limit_bytes).await {
                    Ok(Some(bytes)) => {
                        debug!("Audio data received: {} bytes", bytes.len());
                        audio_data = Some(bytes);
                    }
                    Ok(None) => {
                        warn!(
                            "Rejected upload larger than {} bytes",
                            data.upload_limit_bytes
                        );
                        return HttpResponse::PayloadTooLarge().json(serde_json::json!({
                            "error": "Audio file is too large"
                        }));
                    }
                    Err(e) => {
                        error!("Failed to read audio data: {e}");
                        return HttpResponse::BadRequest().json(serde_json::json!({
                            "error": "Failed to read audio data"
                        }));
                    }
                }
            }
            _ => continue,
        }
    }

    let audio_bytes = match audio_data {
        Some(data) => data,
        None => {
            warn!("No audio file provided in transcription request");
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "No audio file provided"
            }));
        }
    };

    let extension = match file_name.as_deref().and_then(file_extension) {
        Some(extension) => extension,
        None => {
            warn!("Rejected upload with unsupported file name {file_name:?}");
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": "Unsupported file type, expected mp3, wav or m4a"
            }));
        }
    };

    let workspace = match JobWorkspace::create(&data.spool_dir) {
        Ok(workspace) => workspace,
        Err(e) => {
            error!("Failed to create job workspace: {e:#}");
            return HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Failed to prepare transcription job"
            }));
        }
    };

    let upload_path = workspace.upload_path(&extension);
    if let Err(e) = tokio::fs::write(&upload_path, &audio_bytes).await {
        error!("Failed to spool upload: {e}");
        return HttpResponse::InternalServerError().json(serde_json::json!({
            "error": "Failed to store uploaded file"
        }));
    }

    info!(
        "Processing upload {} ({} bytes) in job {}",
        file_name.as_deref().unwrap_or("<unnamed>"),
        audio_bytes.len(),
        workspace.id()
    );

    let clip = match load_clip(&upload_path) {
        Ok(clip) => clip,
        Err(e) => {
            warn!("Failed to decode upload: {e:#}");
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": format!("Could not decode audio file: {e:#}")
            }));
        }
    };
    debug!("Decoded clip of {}ms", clip.duration_ms());

    let output =
        match run_transcription_job(&data.gemini, &workspace, clip, data.segment_length_ms).await {
            Ok(output) => output,
            Err(e) => {
                error!("Transcription job failed: {e:#}");
                return HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "Transcription job failed"
                }));
            }
        };

    let failed_segments: Vec<usize> = output
        .segments
        .iter()
        .filter(|segment| segment.error.is_some())
        .map(|segment| segment.index)
        .collect();
    if !failed_segments.is_empty() {
        warn!(
            "Job {} finished with {} failed segment(s)",
            workspace.id(),
            failed_segments.len()
        );
    }

    let transcript_path = workspace.transcript_path();
    let stored = data.sessions.store_transcript(
        &token,
        StoredTranscript {
            workspace,
            path: transcript_path,
        },
    );
    if !stored {
        // Session expired while the job ran; the transcript still goes back
        // in the response, but the download link is gone.
        warn!("Session {token} disappeared during transcription");
    }

    HttpResponse::Ok().json(TranscribeDto {
        transcript: output.transcript,
        segments: output.segments,
        failed_segments,
        download: "/api/v1/transcript".to_string(),
    })
}

/// Serves the persisted transcript of the session's most recent job.
#[get("/api/v1/transcript")]
pub async fn download_transcript(data: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let token = match authorize(&data, &req) {
        Ok(token) => token,
        Err(response) => return response,
    };

    let path = match data.sessions.transcript_path(&token) {
        Some(path) => path,
        None => {
            return HttpResponse::NotFound().json(serde_json::json!({
                "error": "No transcript available"
            }));
        }
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => HttpResponse::Ok()
            .insert_header(ContentDisposition {
                disposition: DispositionType::Attachment,
                parameters: vec![DispositionParam::Filename(TRANSCRIPT_FILE_NAME.to_string())],
            })
            .content_type("text/plain; charset=utf-8")
            .body(bytes),
        Err(e) => {
            error!("Failed to read transcript {}: {e}", path.display());
            HttpResponse::NotFound().json(serde_json::json!({
                "error": "Transcript file is no longer available"
            }))
        }
    }
}

fn authorize(data: &web::Data<AppState>, req: &HttpRequest) -> Result<Uuid, HttpResponse> {
    let token = session_token(req).filter(|token| data.sessions.touch(token));
    token.ok_or_else(|| {
        HttpResponse::Unauthorized().json(serde_json::json!({
            "error": "Not authorized"
        }))
    })
}

fn session_token(req: &HttpRequest) -> Option<Uuid> {
    let raw = req.headers().get(SESSION_TOKEN_HEADER)?.to_str().ok()?;
    Uuid::parse_str(raw).ok()
}

fn file_extension(name: &str) -> Option<String> {
    let (_, extension) = name.rsplit_once('.')?;
    let extension = extension.to_ascii_lowercase();
    ALLOWED_EXTENSIONS
        .contains(&extension.as_str())
        .then_some(extension)
}

/// Buffers one multipart field, giving up with `Ok(None)` as soon as it
/// grows past `limit` so an oversized upload never sits in memory whole.
async fn read_field_data(
    mut field: Field,
    limit: usize,
) -> Result<Option<Vec<u8>>, actix_web::Error> {
    let mut data = Vec::new();
    while let Some(chunk) = field.try_next().await? {
        if data.len() + chunk.len() > limit {
            return Ok(None);
        }
        data.extend_from_slice(&chunk);
    }
    debug!("Read field data: {} bytes", data.len());
    Ok(Some(data))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(index)
        .service(health_check)
        .service(open_session)
        .service(transcribe_upload)
        .service(download_transcript);
}

pub async fn run_server(config: AppConfig, host: String, port: u16) -> std::io::Result<()> {
    info!("Starting audio transcription service");

    if let Err(e) = std::fs::create_dir_all(&config.spool_dir) {
        error!(
            "Failed to create spool directory {}: {e}",
            config.spool_dir.display()
        );
        std::process::exit(1);
    }
    info!(
        "Using model {} with {}ms segments, spooling to {}",
        config.gemini_model,
        config.segment_length_ms,
        config.spool_dir.display()
    );

    let app_state = web::Data::new(AppState::from_config(&config));

    info!("Starting HTTP server on {host}:{port}");

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .app_data(web::JsonConfig::default().limit(50 * 1024 * 1024)) // 50MB
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .wrap(Logger::default())
            .configure(configure_routes)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
