use anyhow::{Context, Result};
use log::warn;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const TRANSCRIPT_FILE_NAME: &str = "transcription.txt";

/// Private working directory for one transcription job.
///
/// Every upload gets its own `job-<uuid>` directory under the spool root, so
/// concurrent requests never collide on file names. Dropping the workspace
/// removes the directory and everything in it.
#[derive(Debug)]
pub struct JobWorkspace {
    id: Uuid,
    dir: PathBuf,
}

impl JobWorkspace {
    pub fn create(spool_root: &Path) -> Result<Self> {
        let id = Uuid::new_v4();
        let dir = spool_root.join(format!("job-{id}"));
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create job directory {}", dir.display()))?;
        Ok(Self { id, dir })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the raw upload is spooled, keeping the caller-supplied extension.
    pub fn upload_path(&self, extension: &str) -> PathBuf {
        self.dir.join(format!("upload.{extension}"))
    }

    pub fn segment_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("segment_{index}.wav"))
    }

    pub fn transcript_path(&self) -> PathBuf {
        self.dir.join(TRANSCRIPT_FILE_NAME)
    }

    /// Deletes the upload and segment files once a job is finished, leaving
    /// only the transcript behind for later download. Every entry is
    /// attempted before the first failure is reported.
    pub fn discard_intermediates(&self) -> Result<()> {
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("failed to read job directory {}", self.dir.display()))?;
        let mut first_failure = None;
        for entry in entries {
            let entry = entry?;
            if entry.file_name() == TRANSCRIPT_FILE_NAME {
                continue;
            }
            if let Err(err) = fs::remove_file(entry.path()) {
                if first_failure.is_none() {
                    first_failure = Some(anyhow::Error::from(err).context(format!(
                        "failed to remove intermediate file {}",
                        entry.path().display()
                    )));
                }
            }
        }
        match first_failure {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_dir_all(&self.dir) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!("failed to clean up job directory {}: {err}", self.dir.display());
            }
        }
    }
}
