//! Transactional tournament store.
//!
//! Every mutation goes through [`Storage::transact`]: the closure edits a draft
//! copy of one tournament record while that tournament's lock is held, and the
//! draft replaces the stored record only if the closure returns `Ok` (and, when
//! a data directory is configured, only after the draft is on disk). An `Err`
//! from the closure or from the write drops the draft, so callers never see a
//! half-applied change.
//!
//! Vote books are `Arc`-shared between the committed record and its draft, so
//! the draft copy and the commit comparison grow with the matchup count rather
//! than the vote count. A file-backed store still rewrites the whole tournament
//! document on each committed change.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, RwLock},
};
use tracing::{debug, info};

use crate::error::{BracketError, BracketResult};
use crate::types::{MatchupId, TournamentId, TournamentRecord};

pub trait Storage: Send + Sync {
    /// Adds a new tournament. Fails with `Conflict` if the id is taken.
    fn insert(&self, record: TournamentRecord) -> BracketResult<()>;

    /// Snapshot of the committed record.
    fn load(&self, id: TournamentId) -> BracketResult<TournamentRecord>;

    fn transact<R, F>(&self, id: TournamentId, f: F) -> BracketResult<R>
    where
        F: FnOnce(&mut TournamentRecord) -> BracketResult<R>;

    /// Tournament that owns a matchup, for calls addressed by matchup id alone.
    fn locate_matchup(&self, matchup_id: MatchupId) -> BracketResult<TournamentId>;

    fn tournament_ids(&self) -> BracketResult<Vec<TournamentId>>;
}

type SharedRecord = Arc<Mutex<TournamentRecord>>;

#[derive(Default)]
pub struct TournamentStore {
    tournaments: RwLock<HashMap<TournamentId, SharedRecord>>,
    matchup_index: RwLock<HashMap<MatchupId, TournamentId>>,
    data_dir: Option<PathBuf>,
}

impl TournamentStore {
    pub fn in_memory() -> Self {
        TournamentStore::default()
    }

    /// File-backed store: one JSON document per tournament.
    pub fn open(dir: impl AsRef<Path>) -> BracketResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .map_err(|e| BracketError::storage(format!("create data dir {}: {e}", dir.display())))?;

        let mut tournaments = HashMap::new();
        let mut matchup_index = HashMap::new();
        let entries = fs::read_dir(&dir)
            .map_err(|e| BracketError::storage(format!("read data dir {}: {e}", dir.display())))?;
        for entry in entries {
            let entry = entry.map_err(|e| BracketError::storage(e.to_string()))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let data = fs::read_to_string(&path)
                .map_err(|e| BracketError::storage(format!("read tournament {}: {e}", path.display())))?;
            let record: TournamentRecord = serde_json::from_str(&data)
                .map_err(|e| BracketError::storage(format!("parse tournament {}: {e}", path.display())))?;
            for matchup in &record.matchups {
                matchup_index.insert(matchup.id, record.id);
            }
            tournaments.insert(record.id, Arc::new(Mutex::new(record)));
        }
        info!("Loaded {} tournament(s) from {}", tournaments.len(), dir.display());

        Ok(TournamentStore {
            tournaments: RwLock::new(tournaments),
            matchup_index: RwLock::new(matchup_index),
            data_dir: Some(dir),
        })
    }

    fn record_path(dir: &Path, id: TournamentId) -> PathBuf {
        dir.join(format!("{id}.json"))
    }

    fn persist(&self, record: &TournamentRecord) -> BracketResult<()> {
        let Some(dir) = self.data_dir.as_deref() else {
            return Ok(());
        };
        let path = Self::record_path(dir, record.id);
        let tmp = dir.join(format!("{}.json.tmp", record.id));
        let payload = serde_json::to_vec(record).map_err(|e| BracketError::storage(e.to_string()))?;
        fs::write(&tmp, payload)
            .map_err(|e| BracketError::storage(format!("write tournament {}: {e}", tmp.display())))?;
        fs::rename(&tmp, &path)
            .map_err(|e| BracketError::storage(format!("commit tournament {}: {e}", path.display())))?;
        debug!("Persisted tournament {} to {}", record.id, path.display());
        Ok(())
    }

    fn shared(&self, id: TournamentId) -> BracketResult<SharedRecord> {
        let guard = self.tournaments.read().map_err(|e| BracketError::storage(e.to_string()))?;
        guard
            .get(&id)
            .cloned()
            .ok_or_else(|| BracketError::not_found(format!("Tournament {id}")))
    }

    fn index_matchups(&self, record: &TournamentRecord) -> BracketResult<()> {
        let mut index = self.matchup_index.write().map_err(|e| BracketError::storage(e.to_string()))?;
        for matchup in &record.matchups {
            index.insert(matchup.id, record.id);
        }
        Ok(())
    }
}

impl Storage for TournamentStore {
    fn insert(&self, record: TournamentRecord) -> BracketResult<()> {
        let mut guard = self.tournaments.write().map_err(|e| BracketError::storage(e.to_string()))?;
        if guard.contains_key(&record.id) {
            return Err(BracketError::Conflict(format!("Tournament {} already exists", record.id)));
        }
        self.persist(&record)?;
        self.index_matchups(&record)?;
        guard.insert(record.id, Arc::new(Mutex::new(record)));
        Ok(())
    }

    fn load(&self, id: TournamentId) -> BracketResult<TournamentRecord> {
        let shared = self.shared(id)?;
        let guard = shared.lock().map_err(|e| BracketError::storage(e.to_string()))?;
        Ok(guard.clone())
    }

    fn transact<R, F>(&self, id: TournamentId, f: F) -> BracketResult<R>
    where
        F: FnOnce(&mut TournamentRecord) -> BracketResult<R>,
    {
        let shared = self.shared(id)?;
        let mut guard = shared.lock().map_err(|e| BracketError::storage(e.to_string()))?;
        let mut draft = guard.clone();
        let out = f(&mut draft)?;
        if draft != *guard {
            self.persist(&draft)?;
            self.index_matchups(&draft)?;
            *guard = draft;
        }
        Ok(out)
    }

    fn locate_matchup(&self, matchup_id: MatchupId) -> BracketResult<TournamentId> {
        let index = self.matchup_index.read().map_err(|e| BracketError::storage(e.to_string()))?;
        index
            .get(&matchup_id)
            .copied()
            .ok_or_else(|| BracketError::not_found(format!("Matchup {matchup_id}")))
    }

    fn tournament_ids(&self) -> BracketResult<Vec<TournamentId>> {
        let guard = self.tournaments.read().map_err(|e| BracketError::storage(e.to_string()))?;
        let mut ids = guard.keys().copied().collect::<Vec<_>>();
        ids.sort();
        Ok(ids)
    }
}
