//! Password-gated web app that transcribes uploaded audio through the
//! Gemini API. Uploads are decoded, split into fixed-length segments and
//! transcribed one segment at a time; the joined transcript is kept on disk
//! for download until the session ends.

pub mod audio;
pub mod cli;
pub mod config;
pub mod gemini;
pub mod pipeline;
pub mod server;
pub mod session;
pub mod workspace;
