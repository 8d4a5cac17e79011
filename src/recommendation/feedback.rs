//! User Feedback
//!
//! Append-only log of user interactions with programs, persisted through a
//! [`FeedbackStore`], and the score adjustment derived from it.
//!
//! Adjustment folds every record a user left on a program, in order:
//! - last of liked/disliked wins as the sentiment
//! - completed is remembered separately
//!
//! | state | multiplier |
//! |---|---|
//! | liked | 1.5 |
//! | disliked | 0.3 |
//! | completed only | 1.1 |
//! | anything else | 1.0 |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

pub const LIKED_MULTIPLIER: f64 = 1.5;
pub const DISLIKED_MULTIPLIER: f64 = 0.3;
pub const COMPLETED_MULTIPLIER: f64 = 1.1;

/// Kinds of interaction a user can report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Viewed,
    Started,
    Completed,
    Liked,
    Disliked,
    Skipped,
    Rated,
}

impl FeedbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackKind::Viewed => "viewed",
            FeedbackKind::Started => "started",
            FeedbackKind::Completed => "completed",
            FeedbackKind::Liked => "liked",
            FeedbackKind::Disliked => "disliked",
            FeedbackKind::Skipped => "skipped",
            FeedbackKind::Rated => "rated",
        }
    }
}

impl FromStr for FeedbackKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "viewed" => Ok(FeedbackKind::Viewed),
            "started" => Ok(FeedbackKind::Started),
            "completed" => Ok(FeedbackKind::Completed),
            "liked" => Ok(FeedbackKind::Liked),
            "disliked" => Ok(FeedbackKind::Disliked),
            "skipped" => Ok(FeedbackKind::Skipped),
            "rated" => Ok(FeedbackKind::Rated),
            other => Err(Error::validation(
                "feedback_type",
                format!("'{}' is not a recognised feedback type", other),
            )),
        }
    }
}

/// One stored interaction; the owning user is the key it is filed under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub program_id: String,
    pub feedback_type: FeedbackKind,
    #[serde(default)]
    pub rating: Option<u8>,
    pub timestamp: DateTime<Utc>,
}

/// A recorded interaction together with its user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub user_id: String,
    pub program_id: String,
    pub feedback_type: FeedbackKind,
    pub rating: Option<u8>,
    pub timestamp: DateTime<Utc>,
}

/// Whole log, keyed by user id
pub type FeedbackSnapshot = BTreeMap<String, Vec<FeedbackEntry>>;

// ============================================================================
// Persistence
// ============================================================================

/// Durable home of the feedback log
pub trait FeedbackStore: Send + Sync {
    /// Read the last saved snapshot. Never fails: unreadable data is recovered
    /// from a backup or replaced by an empty log.
    fn load(&self) -> FeedbackSnapshot;

    /// Replace the stored snapshot atomically
    fn save(&self, snapshot: &FeedbackSnapshot) -> Result<()>;
}

/// JSON file store with an atomic rename on write and a backup copy
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
    backup_path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>, backup_path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backup_path: backup_path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    fn read(path: &Path) -> std::result::Result<FeedbackSnapshot, ReadFailure> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(ReadFailure::Missing),
            Err(e) => return Err(ReadFailure::Unreadable(e.to_string())),
        };
        serde_json::from_slice(&bytes).map_err(|e| ReadFailure::Unreadable(e.to_string()))
    }

    /// Keep the current primary as the backup, but only if it still parses
    fn refresh_backup(&self) {
        if Self::read(&self.path).is_ok() {
            if let Err(e) = fs::copy(&self.path, &self.backup_path) {
                warn!(
                    backup = %self.backup_path.display(),
                    "Failed to refresh feedback backup: {}", e
                );
            }
        }
    }
}

enum ReadFailure {
    Missing,
    Unreadable(String),
}

impl FeedbackStore for JsonFileStore {
    fn load(&self) -> FeedbackSnapshot {
        let primary_reason = match Self::read(&self.path) {
            Ok(snapshot) => {
                info!(
                    path = %self.path.display(),
                    users = snapshot.len(),
                    "Loaded feedback store"
                );
                return snapshot;
            }
            Err(ReadFailure::Missing) => None,
            Err(ReadFailure::Unreadable(reason)) => Some(reason),
        };

        if let Some(reason) = &primary_reason {
            warn!(
                path = %self.path.display(),
                "Feedback store unreadable ({}), trying backup", reason
            );
        }

        match Self::read(&self.backup_path) {
            Ok(snapshot) => {
                warn!(
                    backup = %self.backup_path.display(),
                    users = snapshot.len(),
                    "Restored feedback from backup"
                );
                snapshot
            }
            Err(ReadFailure::Missing) if primary_reason.is_none() => {
                info!(path = %self.path.display(), "No feedback store yet, starting empty");
                FeedbackSnapshot::new()
            }
            Err(_) => {
                error!(
                    path = %self.path.display(),
                    backup = %self.backup_path.display(),
                    "Feedback store and backup unusable, starting from an empty log"
                );
                FeedbackSnapshot::new()
            }
        }
    }

    fn save(&self, snapshot: &FeedbackSnapshot) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)
            .map_err(|e| Error::store_with_source("failed to create store directory", e))?;

        self.refresh_backup();

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| Error::store_with_source("failed to create temp file", e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, snapshot)?;
            writer.flush()?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| Error::store_with_source("failed to sync feedback store", e))?;
        tmp.persist(&self.path)
            .map_err(|e| Error::store_with_source("failed to replace feedback store", e.error))?;

        debug!(path = %self.path.display(), users = snapshot.len(), "Feedback store saved");
        Ok(())
    }
}

/// Non-durable store for tests and ephemeral deployments
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<FeedbackSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FeedbackStore for MemoryStore {
    fn load(&self) -> FeedbackSnapshot {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn save(&self, snapshot: &FeedbackSnapshot) -> Result<()> {
        *self.saved.lock().unwrap_or_else(PoisonError::into_inner) = snapshot.clone();
        Ok(())
    }
}

// ============================================================================
// Folding and adjustment
// ============================================================================

/// Latest state of one user's relationship with one program
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedbackSignal {
    pub sentiment: Option<Sentiment>,
    pub completed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentiment {
    Liked,
    Disliked,
}

impl FeedbackSignal {
    fn apply(&mut self, kind: FeedbackKind) {
        match kind {
            FeedbackKind::Liked => self.sentiment = Some(Sentiment::Liked),
            FeedbackKind::Disliked => self.sentiment = Some(Sentiment::Disliked),
            FeedbackKind::Completed => self.completed = true,
            _ => {}
        }
    }

    pub fn multiplier(&self) -> f64 {
        match (self.sentiment, self.completed) {
            (Some(Sentiment::Liked), _) => LIKED_MULTIPLIER,
            (Some(Sentiment::Disliked), _) => DISLIKED_MULTIPLIER,
            (None, true) => COMPLETED_MULTIPLIER,
            (None, false) => 1.0,
        }
    }
}

/// Frozen per-user view of the log, taken once per recommendation call
#[derive(Debug, Clone, Default)]
pub struct FeedbackAdjuster {
    signals: HashMap<String, FeedbackSignal>,
}

impl FeedbackAdjuster {
    pub fn from_entries(entries: &[FeedbackEntry]) -> Self {
        let mut signals: HashMap<String, FeedbackSignal> = HashMap::new();
        for entry in entries {
            signals
                .entry(entry.program_id.clone())
                .or_default()
                .apply(entry.feedback_type);
        }
        Self { signals }
    }

    pub fn signal(&self, program_id: &str) -> FeedbackSignal {
        self.signals.get(program_id).copied().unwrap_or_default()
    }

    pub fn adjust(&self, program_id: &str, base_score: f64) -> f64 {
        base_score * self.signal(program_id).multiplier()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }
}

/// Learned preferences of a single user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub liked_programs: Vec<String>,
    pub completed_programs: Vec<String>,
    pub disliked_programs: Vec<String>,
    pub total_interactions: usize,
}

// ============================================================================
// Log
// ============================================================================

/// Shared feedback log. Reads never block each other; a write holds the lock
/// until the store has accepted the new snapshot.
pub struct FeedbackLog {
    entries: RwLock<FeedbackSnapshot>,
    store: Arc<dyn FeedbackStore>,
}

impl FeedbackLog {
    pub fn open(store: Arc<dyn FeedbackStore>) -> Self {
        let entries = store.load();
        Self {
            entries: RwLock::new(entries),
            store,
        }
    }

    pub fn in_memory() -> Self {
        Self::open(Arc::new(MemoryStore::new()))
    }

    /// Append one interaction and persist the log
    pub fn record(
        &self,
        user_id: &str,
        program_id: &str,
        kind: FeedbackKind,
        rating: Option<u8>,
    ) -> Result<FeedbackRecord> {
        if user_id.trim().is_empty() {
            return Err(Error::validation("user_id", "must not be blank"));
        }
        if program_id.trim().is_empty() {
            return Err(Error::validation("program_id", "must not be blank"));
        }
        if let Some(r) = rating {
            if !(1..=5).contains(&r) {
                return Err(Error::validation("rating", format!("{} is outside 1..=5", r)));
            }
        }
        if kind == FeedbackKind::Rated && rating.is_none() {
            return Err(Error::validation("rating", "required for rated feedback"));
        }

        let entry = FeedbackEntry {
            program_id: program_id.to_string(),
            feedback_type: kind,
            rating,
            timestamp: Utc::now(),
        };

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries
            .entry(user_id.to_string())
            .or_default()
            .push(entry.clone());

        if let Err(e) = self.store.save(&entries) {
            if let Some(list) = entries.get_mut(user_id) {
                list.pop();
                if list.is_empty() {
                    entries.remove(user_id);
                }
            }
            return Err(e);
        }
        drop(entries);

        metrics::counter!("fitrec_feedback_recorded_total", "kind" => kind.as_str()).increment(1);
        info!(user_id, program_id, kind = kind.as_str(), "Feedback recorded");

        Ok(FeedbackRecord {
            user_id: user_id.to_string(),
            program_id: entry.program_id,
            feedback_type: entry.feedback_type,
            rating: entry.rating,
            timestamp: entry.timestamp,
        })
    }

    /// Snapshot the signals of one user. Unknown users get an empty adjuster.
    pub fn adjuster_for(&self, user_id: &str) -> FeedbackAdjuster {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(user_id)
            .map(|list| FeedbackAdjuster::from_entries(list))
            .unwrap_or_default()
    }

    /// Rescale a score by what this user said about the program before
    pub fn adjust(&self, user_id: &str, program_id: &str, base_score: f64) -> f64 {
        self.adjuster_for(user_id).adjust(program_id, base_score)
    }

    pub fn user_preferences(&self, user_id: &str) -> UserPreferences {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = entries.get(user_id) else {
            return UserPreferences::default();
        };

        let mut prefs = UserPreferences {
            total_interactions: list.len(),
            ..Default::default()
        };
        for entry in list {
            let bucket = match entry.feedback_type {
                FeedbackKind::Liked => &mut prefs.liked_programs,
                FeedbackKind::Completed => &mut prefs.completed_programs,
                FeedbackKind::Disliked => &mut prefs.disliked_programs,
                _ => continue,
            };
            if !bucket.contains(&entry.program_id) {
                bucket.push(entry.program_id.clone());
            }
        }
        prefs
    }

    /// Programs most often liked or completed across all users, with their counts.
    /// Equal counts are ordered by program id.
    pub fn trending(&self, n: usize) -> Vec<(String, usize)> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for entry in entries.values().flatten() {
            if matches!(
                entry.feedback_type,
                FeedbackKind::Liked | FeedbackKind::Completed
            ) {
                *counts.entry(entry.program_id.as_str()).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(id, count)| (id.to_string(), count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(n);
        ranked
    }

    /// Implicit ratings for the collaborative scorer, one per (user, program).
    ///
    /// The strongest signal wins: liked 5, completed 4, explicit rating, started 3,
    /// viewed 2, skipped or disliked 1.
    pub fn implicit_ratings(&self) -> Vec<(String, String, f64)> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut out = Vec::new();
        for (user_id, list) in entries.iter() {
            let mut best: BTreeMap<&str, f64> = BTreeMap::new();
            for entry in list {
                let value = match entry.feedback_type {
                    FeedbackKind::Liked => 5.0,
                    FeedbackKind::Completed => 4.0,
                    FeedbackKind::Rated => f64::from(entry.rating.unwrap_or(3)),
                    FeedbackKind::Started => 3.0,
                    FeedbackKind::Viewed => 2.0,
                    FeedbackKind::Skipped | FeedbackKind::Disliked => 1.0,
                };
                let slot = best.entry(entry.program_id.as_str()).or_insert(value);
                *slot = slot.max(value);
            }
            out.extend(
                best.into_iter()
                    .map(|(program, value)| (user_id.clone(), program.to_string(), value)),
            );
        }
        out
    }

    /// Number of interactions recorded for one user
    pub fn interaction_count(&self, user_id: &str) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn user_count(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liked_boosts_and_disliked_penalises() {
        let log = FeedbackLog::in_memory();
        log.record("u1", "p1", FeedbackKind::Liked, None).unwrap();
        log.record("u1", "p2", FeedbackKind::Disliked, None).unwrap();

        assert!((log.adjust("u1", "p1", 0.5) - 0.75).abs() < 1e-9);
        assert!((log.adjust("u1", "p2", 0.5) - 0.15).abs() < 1e-9);
        assert_eq!(log.adjust("u1", "p3", 0.5), 0.5);
    }

    #[test]
    fn test_unknown_user_is_no_signal() {
        let log = FeedbackLog::in_memory();
        assert_eq!(log.adjust("nobody", "p1", 0.42), 0.42);
        assert!(log.adjuster_for("nobody").is_empty());
    }

    #[test]
    fn test_latest_sentiment_wins() {
        let log = FeedbackLog::in_memory();
        log.record("u1", "p1", FeedbackKind::Liked, None).unwrap();
        log.record("u1", "p1", FeedbackKind::Disliked, None).unwrap();
        assert!((log.adjust("u1", "p1", 1.0) - DISLIKED_MULTIPLIER).abs() < 1e-9);
    }

    #[test]
    fn test_completed_only_small_boost() {
        let log = FeedbackLog::in_memory();
        log.record("u1", "p1", FeedbackKind::Completed, None).unwrap();
        assert!((log.adjust("u1", "p1", 1.0) - COMPLETED_MULTIPLIER).abs() < 1e-9);

        log.record("u1", "p1", FeedbackKind::Liked, None).unwrap();
        assert!((log.adjust("u1", "p1", 1.0) - LIKED_MULTIPLIER).abs() < 1e-9);
    }

    #[test]
    fn test_record_validation() {
        let log = FeedbackLog::in_memory();
        assert!(log.record("", "p1", FeedbackKind::Viewed, None).is_err());
        assert!(log.record("u1", "p1", FeedbackKind::Rated, Some(6)).is_err());
        assert!(log.record("u1", "p1", FeedbackKind::Rated, None).is_err());
        assert!(log.record("u1", "p1", FeedbackKind::Rated, Some(4)).is_ok());
        assert_eq!(log.user_count(), 1);
    }

    #[test]
    fn test_feedback_kind_parse() {
        assert_eq!("Liked".parse::<FeedbackKind>().unwrap(), FeedbackKind::Liked);
        assert!("loved".parse::<FeedbackKind>().is_err());
    }

    #[test]
    fn test_user_preferences() {
        let log = FeedbackLog::in_memory();
        log.record("u1", "p1", FeedbackKind::Liked, None).unwrap();
        log.record("u1", "p1", FeedbackKind::Liked, None).unwrap();
        log.record("u1", "p2", FeedbackKind::Completed, None).unwrap();
        log.record("u1", "p3", FeedbackKind::Viewed, None).unwrap();

        let prefs = log.user_preferences("u1");
        assert_eq!(prefs.liked_programs, vec!["p1".to_string()]);
        assert_eq!(prefs.completed_programs, vec!["p2".to_string()]);
        assert!(prefs.disliked_programs.is_empty());
        assert_eq!(prefs.total_interactions, 4);
        assert_eq!(log.user_preferences("u2"), UserPreferences::default());
    }

    #[test]
    fn test_trending() {
        let log = FeedbackLog::in_memory();
        log.record("u1", "p1", FeedbackKind::Liked, None).unwrap();
        log.record("u2", "p1", FeedbackKind::Completed, None).unwrap();
        log.record("u2", "p2", FeedbackKind::Liked, None).unwrap();
        log.record("u3", "p3", FeedbackKind::Viewed, None).unwrap();
        log.record("u3", "p0", FeedbackKind::Liked, None).unwrap();

        let trending = log.trending(10);
        assert_eq!(
            trending,
            vec![
                ("p1".to_string(), 2),
                ("p0".to_string(), 1),
                ("p2".to_string(), 1)
            ]
        );
        assert_eq!(log.trending(1).len(), 1);
    }

    #[test]
    fn test_implicit_ratings_keep_strongest_signal() {
        let log = FeedbackLog::in_memory();
        log.record("u1", "p1", FeedbackKind::Viewed, None).unwrap();
        log.record("u1", "p1", FeedbackKind::Liked, None).unwrap();
        let ratings = log.implicit_ratings();
        assert_eq!(ratings, vec![("u1".to_string(), "p1".to_string(), 5.0)]);
    }

    #[test]
    fn test_json_store_round_trip_and_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.json");
        let backup = dir.path().join("feedback.json.bak");
        let store = Arc::new(JsonFileStore::new(&path, &backup));

        let log = FeedbackLog::open(store.clone());
        log.record("u1", "p1", FeedbackKind::Liked, None).unwrap();
        assert!(path.exists());
        // first save had no previous primary to back up
        assert!(!backup.exists());

        log.record("u1", "p2", FeedbackKind::Disliked, None).unwrap();
        assert!(backup.exists());

        let reopened = FeedbackLog::open(store);
        assert!((reopened.adjust("u1", "p1", 1.0) - 1.5).abs() < 1e-9);
        assert!((reopened.adjust("u1", "p2", 1.0) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_corrupt_primary_falls_back_to_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.json");
        let backup = dir.path().join("feedback.json.bak");
        let store = Arc::new(JsonFileStore::new(&path, &backup));

        let log = FeedbackLog::open(store.clone());
        log.record("u1", "p1", FeedbackKind::Liked, None).unwrap();
        log.record("u1", "p2", FeedbackKind::Viewed, None).unwrap();

        fs::write(&path, b"{ not json").unwrap();
        let recovered = FeedbackLog::open(store);
        assert!((recovered.adjust("u1", "p1", 1.0) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_corrupt_primary_without_backup_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feedback.json");
        fs::write(&path, b"garbage").unwrap();

        let store = Arc::new(JsonFileStore::new(&path, dir.path().join("missing.bak")));
        let log = FeedbackLog::open(store);
        assert_eq!(log.user_count(), 0);
    }
}
