use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;

use crate::atomic::{atomic_write_json, read_json, recover_orphans};
use crate::errors::PersistenceError;
use waypoint_types::{AutopilotSession, Bug, Campaign, Checkpoint, Feature, Session};

/// A directory holding one JSON file per entity, keyed by id
/// (`spec.md` §4.1, §6). Generic over the entity type so each concrete
/// kind (Feature, Checkpoint, Campaign, AutopilotSession) gets load,
/// save, list, and delete without repeating the file-management logic.
struct JsonDir {
    dir: PathBuf,
}

impl JsonDir {
    fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn recover(&self) -> Result<(), PersistenceError> {
        recover_orphans(&self.dir).await
    }

    async fn load<T: DeserializeOwned>(&self, id: &str) -> Result<Option<T>, PersistenceError> {
        read_json(&self.path_for(id)).await
    }

    async fn save<T: Serialize>(&self, id: &str, value: &T) -> Result<(), PersistenceError> {
        atomic_write_json(&self.path_for(id), value).await
    }

    async fn delete(&self, id: &str) -> Result<bool, PersistenceError> {
        match fs::remove_file(self.path_for(id)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(PersistenceError::Write {
                path: self.path_for(id),
                source,
            }),
        }
    }

    async fn list<T: DeserializeOwned>(&self) -> Result<Vec<T>, PersistenceError> {
        let mut out = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(source) => {
                return Err(PersistenceError::Read {
                    path: self.dir.clone(),
                    source,
                })
            }
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| PersistenceError::Read {
                path: self.dir.clone(),
                source,
            })?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(value) = read_json(&path).await? {
                out.push(value);
            }
        }
        Ok(out)
    }
}

/// One file per entity under the fixed directory hierarchy (`spec.md` §6):
/// `features/`, `bugs/<id>/state.json`, `sessions/<feature>/<issue>/`,
/// `checkpoints/`, `campaigns/`, `autopilot/`.
pub struct StateStore {
    root: PathBuf,
    features: JsonDir,
    bugs_root: PathBuf,
    sessions_root: PathBuf,
    checkpoints: JsonDir,
    campaigns: JsonDir,
    autopilot: JsonDir,
}

impl StateStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let root = root.into();
        let store = Self {
            features: JsonDir::new(root.join("features")),
            bugs_root: root.join("bugs"),
            sessions_root: root.join("sessions"),
            checkpoints: JsonDir::new(root.join("checkpoints")),
            campaigns: JsonDir::new(root.join("campaigns")),
            autopilot: JsonDir::new(root.join("autopilot")),
            root,
        };
        store.recover_all().await?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn recover_all(&self) -> Result<(), PersistenceError> {
        self.features.recover().await?;
        self.checkpoints.recover().await?;
        self.campaigns.recover().await?;
        self.autopilot.recover().await?;
        recover_orphans(&self.bugs_root).await?;
        Ok(())
    }

    pub async fn load_feature(&self, feature_id: &str) -> Result<Option<Feature>, PersistenceError> {
        self.features.load(feature_id).await
    }

    pub async fn save_feature(&self, feature: &Feature) -> Result<(), PersistenceError> {
        self.features.save(&feature.feature_id, feature).await
    }

    pub async fn list_features(&self) -> Result<Vec<Feature>, PersistenceError> {
        self.features.list().await
    }

    pub async fn delete_feature(&self, feature_id: &str) -> Result<bool, PersistenceError> {
        self.features.delete(feature_id).await
    }

    fn bug_path(&self, bug_id: &str) -> PathBuf {
        self.bugs_root.join(bug_id).join("state.json")
    }

    pub async fn load_bug(&self, bug_id: &str) -> Result<Option<Bug>, PersistenceError> {
        read_json(&self.bug_path(bug_id)).await
    }

    pub async fn save_bug(&self, bug: &Bug) -> Result<(), PersistenceError> {
        atomic_write_json(&self.bug_path(&bug.bug_id), bug).await
    }

    pub async fn delete_bug(&self, bug_id: &str) -> Result<bool, PersistenceError> {
        match fs::remove_dir_all(self.bugs_root.join(bug_id)).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(PersistenceError::Write {
                path: self.bug_path(bug_id),
                source,
            }),
        }
    }

    pub async fn list_bugs(&self) -> Result<Vec<Bug>, PersistenceError> {
        let mut out = Vec::new();
        let mut entries = match fs::read_dir(&self.bugs_root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(source) => {
                return Err(PersistenceError::Read {
                    path: self.bugs_root.clone(),
                    source,
                })
            }
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| PersistenceError::Read {
                path: self.bugs_root.clone(),
                source,
            })?
        {
            let state_path = entry.path().join("state.json");
            if let Some(bug) = read_json(&state_path).await? {
                out.push(bug);
            }
        }
        Ok(out)
    }

    fn session_dir(&self, feature_id: &str, issue_number: u32) -> PathBuf {
        self.sessions_root
            .join(feature_id)
            .join(issue_number.to_string())
    }

    pub async fn save_session(&self, session: &Session) -> Result<(), PersistenceError> {
        let dir = self.session_dir(&session.feature_id, session.issue_number);
        let path = dir.join(format!("{}.json", session.session_id));
        atomic_write_json(&path, session).await
    }

    pub async fn load_session(
        &self,
        feature_id: &str,
        issue_number: u32,
        session_id: &str,
    ) -> Result<Option<Session>, PersistenceError> {
        let path = self
            .session_dir(feature_id, issue_number)
            .join(format!("{session_id}.json"));
        read_json(&path).await
    }

    pub async fn list_sessions_for_issue(
        &self,
        feature_id: &str,
        issue_number: u32,
    ) -> Result<Vec<Session>, PersistenceError> {
        let dir = self.session_dir(feature_id, issue_number);
        let mut out = Vec::new();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(source) => return Err(PersistenceError::Read { path: dir, source }),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| PersistenceError::Read {
                path: dir.clone(),
                source,
            })?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(session) = read_json(&path).await? {
                out.push(session);
            }
        }
        Ok(out)
    }

    pub async fn load_checkpoint(
        &self,
        checkpoint_id: &str,
    ) -> Result<Option<Checkpoint>, PersistenceError> {
        self.checkpoints.load(checkpoint_id).await
    }

    pub async fn save_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), PersistenceError> {
        self.checkpoints
            .save(&checkpoint.checkpoint_id, checkpoint)
            .await
    }

    pub async fn list_pending_checkpoints(&self) -> Result<Vec<Checkpoint>, PersistenceError> {
        let all: Vec<Checkpoint> = self.checkpoints.list().await?;
        Ok(all.into_iter().filter(|c| c.is_pending()).collect())
    }

    pub async fn load_campaign(&self, campaign_id: &str) -> Result<Option<Campaign>, PersistenceError> {
        self.campaigns.load(campaign_id).await
    }

    pub async fn save_campaign(&self, campaign: &Campaign) -> Result<(), PersistenceError> {
        self.campaigns.save(&campaign.campaign_id, campaign).await
    }

    pub async fn load_autopilot_session(
        &self,
        session_id: &str,
    ) -> Result<Option<AutopilotSession>, PersistenceError> {
        self.autopilot.load(session_id).await
    }

    pub async fn save_autopilot_session(
        &self,
        session: &AutopilotSession,
    ) -> Result<(), PersistenceError> {
        self.autopilot.save(&session.session_id, session).await
    }

    pub async fn list_autopilot_sessions(&self) -> Result<Vec<AutopilotSession>, PersistenceError> {
        self.autopilot.list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use waypoint_types::{BugPhase, FeaturePhase};

    #[tokio::test]
    async fn save_then_load_feature_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).await.unwrap();
        let feature = Feature::new("f1");
        store.save_feature(&feature).await.unwrap();
        let loaded = store.load_feature("f1").await.unwrap().unwrap();
        assert_eq!(loaded.phase, FeaturePhase::PrdReady);
    }

    #[tokio::test]
    async fn missing_entity_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).await.unwrap();
        assert!(store.load_feature("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bug_round_trips_under_nested_state_json() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).await.unwrap();
        let bug = Bug::new("b1");
        store.save_bug(&bug).await.unwrap();
        assert!(dir.path().join("bugs/b1/state.json").exists());
        let loaded = store.load_bug("b1").await.unwrap().unwrap();
        assert_eq!(loaded.phase, BugPhase::Reported);
    }

    #[tokio::test]
    async fn listing_features_returns_all_saved() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).await.unwrap();
        store.save_feature(&Feature::new("f1")).await.unwrap();
        store.save_feature(&Feature::new("f2")).await.unwrap();
        let all = store.list_features().await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn pending_checkpoints_excludes_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).await.unwrap();
        let pending = Checkpoint::new(
            waypoint_types::CheckpointTrigger::Blocker,
            "ctx",
            "q",
            vec![],
            "ses-1",
        );
        let mut resolved = Checkpoint::new(
            waypoint_types::CheckpointTrigger::Hiccup,
            "ctx",
            "q",
            vec![waypoint_types::CheckpointOption {
                id: "a".into(),
                label: "a".into(),
                description: String::new(),
                tradeoffs: Default::default(),
                is_recommended: false,
            }],
            "ses-2",
        );
        resolved.resolve("a", true, None).unwrap();
        store.save_checkpoint(&pending).await.unwrap();
        store.save_checkpoint(&resolved).await.unwrap();
        let still_pending = store.list_pending_checkpoints().await.unwrap();
        assert_eq!(still_pending.len(), 1);
        assert_eq!(still_pending[0].checkpoint_id, pending.checkpoint_id);
    }
}
