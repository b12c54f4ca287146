use dashmap::DashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::workspace::JobWorkspace;

/// Sessions untouched for this long are dropped on the next store access,
/// along with any transcript they still hold.
const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Compares submitted passwords against the one configured secret.
#[derive(Clone, Debug)]
pub struct AccessGate {
    password: String,
}

impl AccessGate {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }

    pub fn is_authorized(&self, candidate: &str) -> bool {
        candidate == self.password
    }
}

/// Transcript retained for a session after its job finished. Holding the
/// workspace keeps the file on disk; dropping it deletes the directory.
pub struct StoredTranscript {
    pub workspace: JobWorkspace,
    pub path: PathBuf,
}

struct SessionEntry {
    last_seen: Instant,
    transcript: Option<StoredTranscript>,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            last_seen: Instant::now(),
            transcript: None,
        }
    }
}

/// In-memory registry of authenticated visitors, keyed by opaque token.
pub struct SessionStore {
    entries: DashMap<Uuid, SessionEntry>,
    idle_timeout: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            idle_timeout: SESSION_IDLE_TIMEOUT,
        }
    }

    #[cfg(test)]
    fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            idle_timeout,
        }
    }

    /// Mints a fresh session token. Stale sessions are purged on the way in
    /// so the map cannot grow without bound.
    pub fn open(&self) -> Uuid {
        self.purge_idle();
        let token = Uuid::new_v4();
        self.entries.insert(token, SessionEntry::new());
        token
    }

    /// Refreshes the session's idle clock. Returns false for unknown or
    /// expired tokens; expired ones are removed here.
    pub fn touch(&self, token: &Uuid) -> bool {
        let expired = {
            let Some(mut entry) = self.entries.get_mut(token) else {
                return false;
            };
            if entry.last_seen.elapsed() > self.idle_timeout {
                true
            } else {
                entry.last_seen = Instant::now();
                false
            }
        };
        if expired {
            self.entries.remove(token);
            return false;
        }
        true
    }

    /// Attaches a finished job's transcript to the session, replacing (and
    /// thereby deleting) whatever transcript the session held before.
    pub fn store_transcript(&self, token: &Uuid, transcript: StoredTranscript) -> bool {
        let Some(mut entry) = self.entries.get_mut(token) else {
            return false;
        };
        entry.transcript = Some(transcript);
        true
    }

    pub fn transcript_path(&self, token: &Uuid) -> Option<PathBuf> {
        let entry = self.entries.get(token)?;
        entry
            .transcript
            .as_ref()
            .map(|transcript| transcript.path.clone())
    }

    fn purge_idle(&self) {
        self.entries
            .retain(|_, entry| entry.last_seen.elapsed() <= self.idle_timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_accepts_exact_match_only() {
        let gate = AccessGate::new("open sesame");
        assert!(gate.is_authorized("open sesame"));
        assert!(!gate.is_authorized("open sesame "));
        assert!(!gate.is_authorized("Open Sesame"));
        assert!(!gate.is_authorized(""));
    }

    #[test]
    fn opened_sessions_stay_valid() {
        let store = SessionStore::new();
        let token = store.open();
        assert!(store.touch(&token));
        assert!(store.touch(&token));
        assert!(!store.touch(&Uuid::new_v4()));
    }

    #[test]
    fn idle_sessions_expire() {
        let store = SessionStore::with_idle_timeout(Duration::from_millis(5));
        let token = store.open();
        std::thread::sleep(Duration::from_millis(20));
        assert!(!store.touch(&token));
        // A second touch sees the entry already gone.
        assert!(!store.touch(&token));
    }

    #[test]
    fn storing_a_new_transcript_drops_the_old_workspace() {
        let spool = tempfile::tempdir().unwrap();
        let store = SessionStore::new();
        let token = store.open();

        let first = JobWorkspace::create(spool.path()).unwrap();
        let first_dir = first.dir().to_path_buf();
        std::fs::write(first.transcript_path(), b"one").unwrap();
        let path = first.transcript_path();
        assert!(store.store_transcript(&token, StoredTranscript {
            workspace: first,
            path,
        }));
        assert_eq!(store.transcript_path(&token).unwrap(), first_dir.join("transcription.txt"));

        let second = JobWorkspace::create(spool.path()).unwrap();
        std::fs::write(second.transcript_path(), b"two").unwrap();
        let path = second.transcript_path();
        assert!(store.store_transcript(&token, StoredTranscript {
            workspace: second,
            path,
        }));

        assert!(!first_dir.exists());
        assert!(store.transcript_path(&token).unwrap().exists());
    }

    #[test]
    fn purging_an_idle_session_drops_its_job_directory() {
        let spool = tempfile::tempdir().unwrap();
        let store = SessionStore::with_idle_timeout(Duration::from_millis(5));
        let token = store.open();

        let workspace = JobWorkspace::create(spool.path()).unwrap();
        let dir = workspace.dir().to_path_buf();
        std::fs::write(workspace.transcript_path(), b"text").unwrap();
        let path = workspace.transcript_path();
        assert!(store.store_transcript(&token, StoredTranscript { workspace, path }));
        assert!(dir.exists());

        std::thread::sleep(Duration::from_millis(20));
        // Opening a new session sweeps out the stale one.
        store.open();
        assert!(!dir.exists());
        assert!(store.transcript_path(&token).is_none());
    }

    #[test]
    fn transcript_lookup_requires_a_stored_job() {
        let store = SessionStore::new();
        let token = store.open();
        assert!(store.transcript_path(&token).is_none());
        assert!(store.transcript_path(&Uuid::new_v4()).is_none());
    }

    #[test]
    fn unknown_tokens_cannot_store_transcripts() {
        let spool = tempfile::tempdir().unwrap();
        let store = SessionStore::new();
        let workspace = JobWorkspace::create(spool.path()).unwrap();
        let path = workspace.transcript_path();
        assert!(!store.store_transcript(&Uuid::new_v4(), StoredTranscript { workspace, path }));
    }
}
