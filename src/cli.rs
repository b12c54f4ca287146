use clap::Parser;

#[derive(Parser)]
#[command(
    name = "audioscribe",
    about = "Audioscribe - password-gated audio transcription web app",
    long_about = "Serves a small web app that takes an audio upload, splits it into \
                  fixed-length segments and transcribes them through the Gemini API. \
                  Credentials and tuning come from the environment: PASSWORD and \
                  GEMINI_API_KEY are required; GEMINI_MODEL, GEMINI_BASE_URL, \
                  SEGMENT_LENGTH_MS and SPOOL_DIR are optional. A .env file next to \
                  the binary is picked up automatically."
)]
pub struct Cli {
    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value = "8080")]
    pub port: u16,
}
