use chrono::{DateTime, Utc};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::Serialize;
use std::{
  cmp::Ordering,
  sync::{Arc, Mutex},
};
use tracing::{debug, info, warn};

use crate::error::{BracketError, BracketResult};
use crate::storage::Storage;
use crate::types::{CompetitorId, Matchup, MatchupId, MatchupKey, SlotIndex, TournamentId, TournamentRecord};

/// Picks the winning slot of a tied final.
pub trait TieBreaker: Send + Sync {
  fn pick(&self, matchup: &Matchup) -> SlotIndex;
}

/// Fair coin flip. Seeded instances replay the same sequence of picks.
pub struct RandomTieBreaker {
  rng: Mutex<StdRng>,
}

impl RandomTieBreaker {
  pub fn from_entropy() -> Self {
    RandomTieBreaker { rng: Mutex::new(StdRng::from_entropy()) }
  }

  pub fn seeded(seed: u64) -> Self {
    RandomTieBreaker { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
  }
}

impl TieBreaker for RandomTieBreaker {
  fn pick(&self, _matchup: &Matchup) -> SlotIndex {
    let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
    if rng.gen_bool(0.5) {
      SlotIndex::First
    } else {
      SlotIndex::Second
    }
  }
}

/// Always resolves ties to the same slot.
pub struct FixedTieBreaker(pub SlotIndex);

impl TieBreaker for FixedTieBreaker {
  fn pick(&self, _matchup: &Matchup) -> SlotIndex {
    self.0
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum AdvanceStatus {
  Advanced {
    winner_id: CompetitorId,
    /// Matchup the winner moved into; `None` when this crowned the champion.
    next: Option<MatchupKey>,
    tie_broken: bool,
  },
  Tie,
  AlreadyAdvanced {
    winner_id: CompetitorId,
  },
  Error {
    detail: String,
  },
}

impl AdvanceStatus {
  pub fn winner_id(&self) -> Option<&CompetitorId> {
    match self {
      AdvanceStatus::Advanced { winner_id, .. } | AdvanceStatus::AlreadyAdvanced { winner_id } => Some(winner_id),
      AdvanceStatus::Tie | AdvanceStatus::Error { .. } => None,
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchupOutcome {
  pub matchup_id: MatchupId,
  pub label: String,
  pub position: u32,
  #[serde(flatten)]
  pub status: AdvanceStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundReport {
  pub tournament_id: TournamentId,
  pub round: u32,
  pub outcomes: Vec<MatchupOutcome>,
  pub champion: Option<CompetitorId>,
}

impl RoundReport {
  pub fn advanced(&self) -> usize {
    self
      .outcomes
      .iter()
      .filter(|o| matches!(o.status, AdvanceStatus::Advanced { .. }))
      .count()
  }

  pub fn ties(&self) -> usize {
    self.outcomes.iter().filter(|o| o.status == AdvanceStatus::Tie).count()
  }

  pub fn errors(&self) -> usize {
    self
      .outcomes
      .iter()
      .filter(|o| matches!(o.status, AdvanceStatus::Error { .. }))
      .count()
  }
}

pub struct AdvancementEngine<S> {
  store: Arc<S>,
  tie_breaker: Arc<dyn TieBreaker>,
}

impl<S> Clone for AdvancementEngine<S> {
  fn clone(&self) -> Self {
    AdvancementEngine {
      store: self.store.clone(),
      tie_breaker: self.tie_breaker.clone(),
    }
  }
}

impl<S: Storage> AdvancementEngine<S> {
  pub fn new(store: Arc<S>, tie_breaker: Arc<dyn TieBreaker>) -> Self {
    AdvancementEngine { store, tie_breaker }
  }

  /// Decides every open matchup of `round`, one transaction per matchup.
  /// Matchups that fail are reported and do not stop the rest of the round.
  pub fn close_round(&self, tournament_id: TournamentId, round: u32, now: DateTime<Utc>) -> BracketResult<RoundReport> {
    let (is_final, targets) = {
      let record = self.store.load(tournament_id)?;
      if round == 0 || round > record.total_rounds() {
        return Err(BracketError::not_found(format!("Round {round}")));
      }
      let targets = record
        .list_round(round)
        .into_iter()
        .map(|m| (m.id, m.key, m.label.clone()))
        .collect::<Vec<_>>();
      (record.is_final_round(round), targets)
    };
    if targets.is_empty() {
      return Err(BracketError::not_found(format!("Matchups for round {round}")));
    }

    let mut outcomes = Vec::with_capacity(targets.len());
    for (matchup_id, key, label) in targets {
      let tie_breaker = self.tie_breaker.as_ref();
      let status = match self
        .store
        .transact(tournament_id, |record| decide(record, key, None, tie_breaker, now))
      {
        Ok(status) => status,
        Err(err) => {
          warn!("Advancing {label} in tournament {tournament_id} failed: {err}");
          AdvanceStatus::Error { detail: err.to_string() }
        }
      };
      debug!("Round {round} matchup {label}: {status:?}");
      outcomes.push(MatchupOutcome { matchup_id, label, position: key.position, status });
    }

    let champion = if is_final {
      outcomes.iter().find_map(|o| o.status.winner_id().cloned())
    } else {
      None
    };
    let report = RoundReport { tournament_id, round, outcomes, champion };
    info!(
      "Closed round {round} of tournament {tournament_id}: {} advanced, {} tied, {} failed",
      report.advanced(),
      report.ties(),
      report.errors()
    );
    if let Some(champion) = &report.champion {
      info!("Tournament {tournament_id} champion: {champion}");
    }
    Ok(report)
  }

  /// Decides a single matchup, optionally overriding the tallies.
  pub fn advance_matchup(
    &self,
    matchup_id: MatchupId,
    forced_winner: Option<&str>,
    now: DateTime<Utc>,
  ) -> BracketResult<MatchupOutcome> {
    let tournament_id = self.store.locate_matchup(matchup_id)?;
    let tie_breaker = self.tie_breaker.as_ref();
    let outcome = self.store.transact(tournament_id, |record| {
      let (key, label) = {
        let matchup = record.matchup_by_id(matchup_id)?;
        if matchup.is_decided() {
          return Err(BracketError::invalid_state(format!("{} has already been decided", matchup.label)));
        }
        (matchup.key, matchup.label.clone())
      };
      let status = decide(record, key, forced_winner, tie_breaker, now)?;
      if status == AdvanceStatus::Tie {
        return Err(BracketError::invalid_state(format!("Cannot advance {label}: votes are tied")));
      }
      Ok(MatchupOutcome { matchup_id, label, position: key.position, status })
    })?;
    info!("Advanced {} in tournament {tournament_id}: {:?}", outcome.label, outcome.status);
    Ok(outcome)
  }
}

fn decide(
  record: &mut TournamentRecord,
  key: MatchupKey,
  forced_winner: Option<&str>,
  tie_breaker: &dyn TieBreaker,
  now: DateTime<Utc>,
) -> BracketResult<AdvanceStatus> {
  let is_final = record.is_final_round(key.round);
  let matchup = record.matchup_mut(key)?;
  if let Some(winner_id) = &matchup.winner {
    return Ok(AdvanceStatus::AlreadyAdvanced { winner_id: winner_id.clone() });
  }
  if matchup.slots.iter().any(Option::is_none) {
    return Err(BracketError::invalid_state(format!("{} is awaiting a competitor", matchup.label)));
  }

  let (winner_slot, tie_broken) = match forced_winner {
    Some(id) => {
      let slot = matchup
        .slot_of(id)
        .ok_or_else(|| BracketError::invalid_input(format!("{id} is not competing in {}", matchup.label)))?;
      (slot, false)
    }
    None => match matchup.tallies[0].cmp(&matchup.tallies[1]) {
      Ordering::Greater => (SlotIndex::First, false),
      Ordering::Less => (SlotIndex::Second, false),
      Ordering::Equal if is_final => (tie_breaker.pick(matchup), true),
      Ordering::Equal => {
        info!("{} tied {}-{}; left open", matchup.label, matchup.tallies[0], matchup.tallies[1]);
        return Ok(AdvanceStatus::Tie);
      }
    },
  };

  let winner_id = matchup
    .competitor(winner_slot)
    .cloned()
    .ok_or_else(|| BracketError::invalid_state(format!("{} is awaiting a competitor", matchup.label)))?;
  matchup.winner = Some(winner_id.clone());
  matchup.completed_at = Some(now);

  if is_final {
    return Ok(AdvanceStatus::Advanced { winner_id, next: None, tie_broken });
  }
  let (next_key, next_slot) = key.next();
  record.upsert_slot(next_key, next_slot, &winner_id)?;
  Ok(AdvanceStatus::Advanced { winner_id, next: Some(next_key), tie_broken })
}
