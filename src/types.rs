use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    sync::Arc,
};
use uuid::Uuid;

use crate::service::BracketService;
use crate::storage::TournamentStore;
use crate::template::BracketTemplate;

// ── Constants ──────────────────────────────────────────────────────────

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:17880";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_CONFIG_FILE: &str = "bracket.json";
pub const CALLER_HEADER: &str = "x-user-id";
/// 2^15 round-one matchups is already far past any voting bracket.
pub const MAX_ROUNDS: u32 = 16;

// ── Identifiers ────────────────────────────────────────────────────────

pub type TournamentId = Uuid;
pub type MatchupId = Uuid;
pub type VoteId = Uuid;
pub type CompetitorId = String;
pub type VoterId = String;
pub type UserId = String;

// ── Shared state type aliases ──────────────────────────────────────────

pub type SharedService = Arc<BracketService<TournamentStore>>;

// ── Config types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Directory for tournament JSON files; empty keeps everything in memory.
    pub data_dir: String,
    pub bind_addr: String,
    pub log_dir: String,
    pub strict_round_order: bool,
    pub tie_break_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: String::new(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            log_dir: DEFAULT_LOG_DIR.to_string(),
            strict_round_order: false,
            tie_break_seed: None,
        }
    }
}

// ── Bracket domain types ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SlotIndex {
    First,
    Second,
}

impl SlotIndex {
    pub fn index(self) -> usize {
        match self {
            SlotIndex::First => 0,
            SlotIndex::Second => 1,
        }
    }

    /// Even positions feed the first slot of the next round, odd ones the second.
    pub fn for_position(position: u32) -> Self {
        if position % 2 == 0 {
            SlotIndex::First
        } else {
            SlotIndex::Second
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchupKey {
    pub round: u32,
    pub position: u32,
}

impl MatchupKey {
    pub fn new(round: u32, position: u32) -> Self {
        MatchupKey { round, position }
    }

    /// Where the winner of this matchup lands in the following round.
    pub fn next(self) -> (MatchupKey, SlotIndex) {
        (
            MatchupKey::new(self.round + 1, self.position / 2),
            SlotIndex::for_position(self.position),
        )
    }

    pub fn default_label(self) -> String {
        format!("r{}-m{}", self.round, self.position + 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchupState {
    Empty,
    Partial,
    Populated,
    Decided,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Matchup {
    pub id: MatchupId,
    pub tournament_id: TournamentId,
    pub label: String,
    pub key: MatchupKey,
    pub slots: [Option<CompetitorId>; 2],
    pub tallies: [u32; 2],
    pub winner: Option<CompetitorId>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Matchup {
    pub fn new(tournament_id: TournamentId, key: MatchupKey, label: String) -> Self {
        Matchup {
            id: Uuid::new_v4(),
            tournament_id,
            label,
            key,
            slots: [None, None],
            tallies: [0, 0],
            winner: None,
            completed_at: None,
        }
    }

    pub fn round(&self) -> u32 {
        self.key.round
    }

    pub fn position(&self) -> u32 {
        self.key.position
    }

    pub fn competitor(&self, slot: SlotIndex) -> Option<&CompetitorId> {
        self.slots[slot.index()].as_ref()
    }

    pub fn tally(&self, slot: SlotIndex) -> u32 {
        self.tallies[slot.index()]
    }

    pub fn total_votes(&self) -> u32 {
        self.tallies[0] + self.tallies[1]
    }

    /// Slot holding `competitor_id`, if it is one of the populated slots.
    pub fn slot_of(&self, competitor_id: &str) -> Option<SlotIndex> {
        [SlotIndex::First, SlotIndex::Second]
            .into_iter()
            .find(|slot| self.competitor(*slot).map(String::as_str) == Some(competitor_id))
    }

    pub fn is_decided(&self) -> bool {
        self.winner.is_some()
    }

    pub fn state(&self) -> MatchupState {
        if self.winner.is_some() {
            return MatchupState::Decided;
        }
        match (&self.slots[0], &self.slots[1]) {
            (Some(_), Some(_)) => MatchupState::Populated,
            (None, None) => MatchupState::Empty,
            _ => MatchupState::Partial,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub id: VoteId,
    pub matchup_id: MatchupId,
    pub voter_id: Option<VoterId>,
    pub competitor_id: CompetitorId,
    pub cast_at: DateTime<Utc>,
}

/// Votes recorded against one matchup. Named votes are keyed by voter, which is
/// what enforces the one-vote-per-voter rule; anonymous votes are kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchupVotes {
    #[serde(default)]
    pub named: BTreeMap<VoterId, Vote>,
    #[serde(default)]
    pub anonymous: Vec<Vote>,
}

impl MatchupVotes {
    pub fn len(&self) -> usize {
        self.named.len() + self.anonymous.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vote> {
        self.named.values().chain(self.anonymous.iter())
    }

    pub fn count_for(&self, competitor_id: &str) -> usize {
        self.iter().filter(|vote| vote.competitor_id == competitor_id).count()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingWindow {
    pub is_active: bool,
    pub current_round: Option<u32>,
}

impl VotingWindow {
    pub fn closed() -> Self {
        VotingWindow { is_active: false, current_round: None }
    }

    pub fn open_for(round: u32) -> Self {
        VotingWindow { is_active: true, current_round: Some(round) }
    }

    pub fn accepts(&self, round: u32) -> bool {
        self.is_active && self.current_round == Some(round)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TournamentStatus {
    Upcoming,
    Active,
    Completed,
}

impl TournamentStatus {
    pub fn at(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        if now < starts_at {
            TournamentStatus::Upcoming
        } else if now > ends_at {
            TournamentStatus::Completed
        } else {
            TournamentStatus::Active
        }
    }
}

/// Everything the engine persists for one tournament. Window, matchups and votes
/// live together so a single transaction sees them consistently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentRecord {
    pub id: TournamentId,
    pub name: String,
    pub owner_id: UserId,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub require_login: bool,
    pub created_at: DateTime<Utc>,
    pub template: BracketTemplate,
    #[serde(default)]
    pub voting_window: VotingWindow,
    /// Sorted by (round, position).
    #[serde(default)]
    pub matchups: Vec<Matchup>,
    /// Shared with transaction drafts; writers go through `Arc::make_mut`.
    #[serde(default)]
    pub votes: BTreeMap<MatchupId, Arc<MatchupVotes>>,
}

impl TournamentRecord {
    pub fn total_rounds(&self) -> u32 {
        self.template.total_rounds()
    }

    pub fn is_final_round(&self, round: u32) -> bool {
        round == self.total_rounds()
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> TournamentStatus {
        TournamentStatus::at(self.starts_at, self.ends_at, now)
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner_id == user_id
    }

    pub fn champion(&self) -> Option<&CompetitorId> {
        let final_round = self.total_rounds();
        self.matchups
            .iter()
            .find(|m| m.round() == final_round)
            .and_then(|m| m.winner.as_ref())
    }

    pub fn votes_for(&self, matchup_id: &MatchupId) -> Option<&MatchupVotes> {
        self.votes.get(matchup_id).map(Arc::as_ref)
    }
}

/// Tournament creation request handed over by the event-creation step.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTournament {
    #[serde(default)]
    pub id: Option<TournamentId>,
    pub name: String,
    pub owner_id: UserId,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub require_login: bool,
    pub template: BracketTemplate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentSummary {
    pub id: TournamentId,
    pub name: String,
    pub status: TournamentStatus,
    pub total_rounds: u32,
    pub voting_window: VotingWindow,
    pub champion: Option<CompetitorId>,
}

impl TournamentSummary {
    pub fn of(record: &TournamentRecord, now: DateTime<Utc>) -> Self {
        TournamentSummary {
            id: record.id,
            name: record.name.clone(),
            status: record.status_at(now),
            total_rounds: record.total_rounds(),
            voting_window: record.voting_window,
            champion: record.champion().cloned(),
        }
    }
}
