//! Saving, loading and sharing session snapshots.
//!
//! Snapshots live as one JSON file per save under the platform data
//! directory. Everything read back in goes through the same field-by-field
//! validation as backend payloads, so a hand-edited or imported file can
//! degrade a session but never crash it.

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context as _};
use chrono::Utc;
use log::debug;

use crate::{
    errors::StorageQuotaError,
    session::{decode_snapshot, SavedSession, SessionState},
    Error, Result,
};

/// ENOSPC, the one io error we special-case.
const DISK_FULL: i32 = 28;

/// The on-disk gallery of saved sessions.
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Open the default store under the platform data directory.
    pub fn open() -> Result<SessionStore> {
        let dir = dirs::data_dir()
            .ok_or_else(|| anyhow!("no data directory found for this platform"))?
            .join("codeforge")
            .join("sessions");
        SessionStore::at(dir)
    }

    /// Open a store rooted at `dir`, creating it if needed.
    pub fn at<P: Into<PathBuf>>(dir: P) -> Result<SessionStore> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("could not create {}", dir.display()))?;
        Ok(SessionStore { dir })
    }

    fn snapshot_path(&self, id: u64) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    fn current_path(&self) -> PathBuf {
        self.dir.join("current.json")
    }

    fn next_id(&self) -> Result<u64> {
        let max = self
            .list()?
            .iter()
            .map(|s| s.id)
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    /// Save a snapshot under `name`, assigning it a fresh id.
    pub fn save(&self, name: &str, state: &SessionState) -> Result<SavedSession> {
        let name = name.trim();
        if name.is_empty() {
            return Err(anyhow!("a saved session needs a name"));
        }
        let session = SavedSession {
            id: self.next_id()?,
            name: name.to_owned(),
            subject_name: state
                .subject
                .as_ref()
                .map(|s| s.name.clone())
                .unwrap_or_default(),
            saved_at: Utc::now(),
            state: state.clone(),
        };
        self.write_json(&self.snapshot_path(session.id), &session)?;
        debug!("saved session {} ({:?})", session.id, session.name);
        Ok(session)
    }

    /// Load a snapshot by id, validating every field.
    pub fn load(&self, id: u64) -> Result<SavedSession> {
        let path = self.snapshot_path(id);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("no saved session {}", id))?;
        let mut session = decode_snapshot(&json)
            .with_context(|| format!("could not read {}", path.display()))?;
        session.id = id;
        Ok(session)
    }

    /// All saved sessions, newest first.
    pub fn list(&self) -> Result<Vec<SavedSession>> {
        let mut sessions = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("could not read {}", self.dir.display()))?
        {
            let path = entry?.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Ok(id) = stem.parse::<u64>() else {
                // current.json and strangers.
                continue;
            };
            match self.load(id) {
                Ok(session) => sessions.push(session),
                Err(e) => debug!("skipping unreadable snapshot {}: {:?}", id, e),
            }
        }
        sessions.sort_by(|a, b| b.saved_at.cmp(&a.saved_at).then(b.id.cmp(&a.id)));
        Ok(sessions)
    }

    /// Delete a snapshot.
    pub fn delete(&self, id: u64) -> Result<()> {
        fs::remove_file(self.snapshot_path(id))
            .with_context(|| format!("no saved session {}", id))
    }

    /// Write a snapshot to `path` for sharing.
    pub fn export(&self, id: u64, path: &Path) -> Result<()> {
        let session = self.load(id)?;
        self.write_json(path, &session)
    }

    /// Import a shared snapshot file, assigning it a fresh id.
    pub fn import(&self, path: &Path) -> Result<SavedSession> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("could not read {}", path.display()))?;
        let mut session = decode_snapshot(&json)
            .with_context(|| format!("could not import {}", path.display()))?;
        session.id = self.next_id()?;
        self.write_json(&self.snapshot_path(session.id), &session)?;
        Ok(session)
    }

    /// Persist the working session between invocations.
    pub fn save_current(&self, state: &SessionState) -> Result<()> {
        self.write_json(&self.current_path(), state)
    }

    /// The working session from the last invocation, if any survives
    /// validation.
    pub fn load_current(&self) -> Result<Option<SessionState>> {
        let path = self.current_path();
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::from(e)
                    .context(format!("could not read {}", path.display())))
            }
        };
        // A corrupt working session is not worth failing startup over.
        match serde_json::from_str::<SessionState>(&json) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                debug!("discarding unreadable working session: {}", e);
                Ok(None)
            }
        }
    }

    /// Drop the working session.
    pub fn clear_current(&self) -> Result<()> {
        match fs::remove_file(self.current_path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_json<T: serde::Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        fs::write(path, json).map_err(|e| {
            if e.raw_os_error() == Some(DISK_FULL) {
                Error::from(e).context(StorageQuotaError)
            } else {
                Error::from(e).context(format!("could not write {}", path.display()))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cards::RawCard,
        session::{Settings, Subject},
    };

    fn state() -> SessionState {
        let mut state = SessionState::default();
        state.subject = Some(Subject::library("React", "JavaScript"));
        state.presentation_deck = vec![RawCard {
            name: Some("useState".to_owned()),
            image_prompt: Some("a phantom".to_owned()),
            ..Default::default()
        }
        .clean()
        .unwrap()];
        state.settings = Settings {
            presentation_cards: 3,
            ..Settings::default()
        };
        state
    }

    #[test]
    fn save_load_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::at(tmp.path().join("sessions")).unwrap();

        let saved = store.save("my react deck", &state()).unwrap();
        assert_eq!(saved.id, 1);
        assert_eq!(saved.subject_name, "React");

        let loaded = store.load(saved.id).unwrap();
        assert_eq!(loaded.name, "my react deck");
        assert_eq!(loaded.state.presentation_deck.len(), 1);
        assert_eq!(loaded.state.settings.presentation_cards, 3);
    }

    #[test]
    fn ids_keep_increasing_and_list_is_newest_first() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::at(tmp.path().join("sessions")).unwrap();

        let a = store.save("first", &state()).unwrap();
        let b = store.save("second", &state()).unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        store.delete(a.id).unwrap();
        let c = store.save("third", &state()).unwrap();
        assert_eq!(c.id, 3);

        let names: Vec<_> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["third", "second"]);
    }

    #[test]
    fn export_import_reassigns_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::at(tmp.path().join("sessions")).unwrap();
        let saved = store.save("shared", &state()).unwrap();

        let shared = tmp.path().join("shared.json");
        store.export(saved.id, &shared).unwrap();

        let other = SessionStore::at(tmp.path().join("other")).unwrap();
        let imported = other.import(&shared).unwrap();
        assert_eq!(imported.id, 1);
        assert_eq!(imported.name, "shared");
        assert_eq!(other.list().unwrap().len(), 1);
    }

    #[test]
    fn import_validates_untrusted_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::at(tmp.path().join("sessions")).unwrap();

        let bad = tmp.path().join("bad.json");
        fs::write(&bad, r#"{"state": {}}"#).unwrap();
        assert!(store.import(&bad).is_err());

        let odd = tmp.path().join("odd.json");
        fs::write(
            &odd,
            r#"{"name": "odd", "state": {"catalogue": ["ok", 42]}}"#,
        )
        .unwrap();
        let imported = store.import(&odd).unwrap();
        assert_eq!(imported.state.catalogue, vec!["ok"]);
    }

    #[test]
    fn current_session_round_trip_and_corruption() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::at(tmp.path().join("sessions")).unwrap();

        assert!(store.load_current().unwrap().is_none());
        store.save_current(&state()).unwrap();
        let current = store.load_current().unwrap().unwrap();
        assert_eq!(current.subject.as_ref().unwrap().name, "React");

        fs::write(store.current_path(), "not json at all").unwrap();
        assert!(store.load_current().unwrap().is_none());

        store.clear_current().unwrap();
        store.clear_current().unwrap();
        assert!(store.load_current().unwrap().is_none());
    }

    #[test]
    fn current_json_is_not_listed_as_a_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::at(tmp.path().join("sessions")).unwrap();
        store.save_current(&state()).unwrap();
        assert!(store.list().unwrap().is_empty());
    }
}
