//! Entry points for callers outside the engine. Owner-only operations check
//! the caller here before delegating to the bracket components.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::advancement::{AdvancementEngine, MatchupOutcome, RandomTieBreaker, RoundReport, TieBreaker};
use crate::error::{BracketError, BracketResult};
use crate::ledger::{VoteLedger, VoteReceipt};
use crate::query::{ConsoleView, TournamentQuery, TournamentView};
use crate::storage::Storage;
use crate::types::{
    EngineConfig, MatchupId, NewTournament, TournamentId, TournamentRecord, TournamentSummary, Vote, VotingWindow,
};
use crate::voting_window::{CloseReport, VotingWindowController};

pub struct BracketService<S> {
    store: Arc<S>,
    advancement: AdvancementEngine<S>,
    ledger: VoteLedger<S>,
    window: VotingWindowController<S>,
    query: TournamentQuery<S>,
}

impl<S: Storage> BracketService<S> {
    pub fn new(store: Arc<S>, tie_breaker: Arc<dyn TieBreaker>, strict_round_order: bool) -> Self {
        let advancement = AdvancementEngine::new(store.clone(), tie_breaker);
        BracketService {
            ledger: VoteLedger::new(store.clone()),
            window: VotingWindowController::new(store.clone(), advancement.clone(), strict_round_order),
            query: TournamentQuery::new(store.clone()),
            advancement,
            store,
        }
    }

    pub fn from_config(store: Arc<S>, config: &EngineConfig) -> Self {
        let tie_breaker = match config.tie_break_seed {
            Some(seed) => RandomTieBreaker::seeded(seed),
            None => RandomTieBreaker::from_entropy(),
        };
        Self::new(store, Arc::new(tie_breaker), config.strict_round_order)
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // ── Tournaments ────────────────────────────────────────────────────

    pub fn create_tournament(&self, request: NewTournament, now: DateTime<Utc>) -> BracketResult<TournamentView> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(BracketError::invalid_input("tournament name must not be blank"));
        }
        let owner_id = request.owner_id.trim();
        if owner_id.is_empty() {
            return Err(BracketError::invalid_input("owner id must not be blank"));
        }
        if request.starts_at >= request.ends_at {
            return Err(BracketError::invalid_input("tournament must start before it ends"));
        }

        let mut record = TournamentRecord {
            id: request.id.unwrap_or_else(Uuid::new_v4),
            name: name.to_string(),
            owner_id: owner_id.to_string(),
            starts_at: request.starts_at,
            ends_at: request.ends_at,
            require_login: request.require_login,
            created_at: now,
            template: request.template.validated()?,
            voting_window: VotingWindow::closed(),
            matchups: Vec::new(),
            votes: Default::default(),
        };
        let seeded = record.initialize_bracket()?;
        let view = crate::query::build_view(&record, now);
        self.store.insert(record)?;
        info!(
            "Created tournament {} ({}) with {} rounds, {seeded} opening matchups",
            view.tournament_id, view.name, view.total_rounds
        );
        Ok(view)
    }

    pub fn list_tournaments(&self, now: DateTime<Utc>) -> BracketResult<Vec<TournamentSummary>> {
        self.store
            .tournament_ids()?
            .into_iter()
            .map(|id| self.store.load(id).map(|record| TournamentSummary::of(&record, now)))
            .collect()
    }

    pub fn view(&self, tournament_id: TournamentId, now: DateTime<Utc>) -> BracketResult<TournamentView> {
        self.query.get_view(tournament_id, now)
    }

    pub fn console(&self, tournament_id: TournamentId, caller: Option<&str>) -> BracketResult<ConsoleView> {
        self.authorize_owner(tournament_id, caller)?;
        self.query.get_console(tournament_id)
    }

    // ── Votes ──────────────────────────────────────────────────────────

    pub fn cast_vote(
        &self,
        matchup_id: MatchupId,
        voter_id: Option<&str>,
        competitor_id: &str,
        now: DateTime<Utc>,
    ) -> BracketResult<VoteReceipt> {
        self.ledger.cast_or_switch(matchup_id, voter_id, competitor_id, now)
    }

    pub fn remove_vote(&self, matchup_id: MatchupId, voter_id: Option<&str>) -> BracketResult<VoteReceipt> {
        self.ledger.remove(matchup_id, voter_id)
    }

    pub fn votes_for(&self, matchup_id: MatchupId) -> BracketResult<Vec<Vote>> {
        self.ledger.votes_for(matchup_id)
    }

    // ── Owner controls ─────────────────────────────────────────────────

    pub fn open_voting(
        &self,
        tournament_id: TournamentId,
        round: u32,
        caller: Option<&str>,
    ) -> BracketResult<VotingWindow> {
        self.authorize_owner(tournament_id, caller)?;
        self.window.open(tournament_id, round)
    }

    pub fn close_voting(
        &self,
        tournament_id: TournamentId,
        caller: Option<&str>,
        now: DateTime<Utc>,
    ) -> BracketResult<CloseReport> {
        self.authorize_owner(tournament_id, caller)?;
        self.window.close(tournament_id, now)
    }

    pub fn advance_round(
        &self,
        tournament_id: TournamentId,
        round: u32,
        caller: Option<&str>,
        now: DateTime<Utc>,
    ) -> BracketResult<RoundReport> {
        self.authorize_owner(tournament_id, caller)?;
        self.advancement.close_round(tournament_id, round, now)
    }

    pub fn advance_matchup(
        &self,
        matchup_id: MatchupId,
        forced_winner: Option<&str>,
        caller: Option<&str>,
        now: DateTime<Utc>,
    ) -> BracketResult<MatchupOutcome> {
        let tournament_id = self.store.locate_matchup(matchup_id)?;
        self.authorize_owner(tournament_id, caller)?;
        self.advancement.advance_matchup(matchup_id, forced_winner, now)
    }

    fn authorize_owner(&self, tournament_id: TournamentId, caller: Option<&str>) -> BracketResult<()> {
        let record = self.store.load(tournament_id)?;
        match caller.map(str::trim) {
            Some(caller) if record.is_owned_by(caller) => Ok(()),
            Some(_) => Err(BracketError::Unauthorized(
                "Only the tournament owner can do that".to_string(),
            )),
            None => Err(BracketError::Unauthorized("Authentication required".to_string())),
        }
    }
}
