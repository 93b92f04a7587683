use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

use crate::advancement::{AdvancementEngine, RoundReport};
use crate::error::{BracketError, BracketResult};
use crate::storage::Storage;
use crate::types::{MatchupKey, TournamentId, TournamentRecord, VotingWindow};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseReport {
  pub closed_round: u32,
  pub voting_window: VotingWindow,
  pub report: RoundReport,
}

/// Opens and closes the single per-tournament voting round.
pub struct VotingWindowController<S> {
  store: Arc<S>,
  advancement: AdvancementEngine<S>,
  strict_round_order: bool,
}

impl<S> Clone for VotingWindowController<S> {
  fn clone(&self) -> Self {
    VotingWindowController {
      store: self.store.clone(),
      advancement: self.advancement.clone(),
      strict_round_order: self.strict_round_order,
    }
  }
}

impl<S: Storage> VotingWindowController<S> {
  pub fn new(store: Arc<S>, advancement: AdvancementEngine<S>, strict_round_order: bool) -> Self {
    VotingWindowController { store, advancement, strict_round_order }
  }

  pub fn strict_round_order(&self) -> bool {
    self.strict_round_order
  }

  pub fn open(&self, tournament_id: TournamentId, round: u32) -> BracketResult<VotingWindow> {
    let strict = self.strict_round_order;
    let window = self.store.transact(tournament_id, |record| {
      let current = record.voting_window;
      if current.is_active {
        return Err(BracketError::invalid_state(format!(
          "Voting is already active for Round {}",
          current.current_round.unwrap_or_default()
        )));
      }
      let matchups = record.list_round(round);
      if matchups.is_empty() {
        return Err(BracketError::not_found(format!("Matchups for round {round}")));
      }
      if matchups.iter().all(|m| m.is_decided()) {
        return Err(BracketError::invalid_state(format!("Round {round} has already been decided")));
      }
      if strict && round > 1 {
        ensure_round_decided(record, round - 1)?;
      }
      record.voting_window = VotingWindow::open_for(round);
      Ok(record.voting_window)
    })?;
    info!("Opened voting for round {round} of tournament {tournament_id}");
    Ok(window)
  }

  /// Closes the active window, then advances its round. The window stays
  /// closed even when individual matchups fail to advance.
  pub fn close(&self, tournament_id: TournamentId, now: DateTime<Utc>) -> BracketResult<CloseReport> {
    let closed_round = self.store.transact(tournament_id, |record| {
      let window = record.voting_window;
      let round = match window.current_round {
        Some(round) if window.is_active => round,
        _ => return Err(BracketError::invalid_state("Voting is not currently active")),
      };
      record.voting_window = VotingWindow::closed();
      Ok(round)
    })?;
    info!("Closed voting for round {closed_round} of tournament {tournament_id}");

    let report = self.advancement.close_round(tournament_id, closed_round, now)?;
    Ok(CloseReport { closed_round, voting_window: VotingWindow::closed(), report })
  }
}

fn ensure_round_decided(record: &TournamentRecord, round: u32) -> BracketResult<()> {
  let expected = record.template.matchups_in_round(round);
  let undecided = (0..expected)
    .filter(|position| {
      record
        .matchup(MatchupKey::new(round, *position))
        .map(|m| !m.is_decided())
        .unwrap_or(true)
    })
    .count();
  if undecided > 0 {
    return Err(BracketError::invalid_state(format!(
      "Round {round} still has {undecided} undecided matchup(s)"
    )));
  }
  Ok(())
}
