use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{mem, sync::Arc};
use tracing::debug;
use uuid::Uuid;

use crate::error::{BracketError, BracketResult};
use crate::storage::Storage;
use crate::types::{CompetitorId, Matchup, MatchupId, MatchupState, Vote, VotingWindow};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum VoteChange {
  Cast,
  Switched { from: CompetitorId },
  Unchanged,
  Removed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteReceipt {
  pub matchup_id: MatchupId,
  pub competitor_id: CompetitorId,
  pub tally1: u32,
  pub tally2: u32,
  pub change: VoteChange,
}

impl VoteReceipt {
  fn new(matchup: &Matchup, competitor_id: CompetitorId, change: VoteChange) -> Self {
    VoteReceipt {
      matchup_id: matchup.id,
      competitor_id,
      tally1: matchup.tallies[0],
      tally2: matchup.tallies[1],
      change,
    }
  }
}

/// Records votes and keeps matchup tallies in step with them. Every call
/// validates and mutates inside one store transaction.
pub struct VoteLedger<S> {
  store: Arc<S>,
}

impl<S> Clone for VoteLedger<S> {
  fn clone(&self) -> Self {
    VoteLedger { store: self.store.clone() }
  }
}

impl<S: Storage> VoteLedger<S> {
  pub fn new(store: Arc<S>) -> Self {
    VoteLedger { store }
  }

  pub fn cast_or_switch(
    &self,
    matchup_id: MatchupId,
    voter_id: Option<&str>,
    competitor_id: &str,
    now: DateTime<Utc>,
  ) -> BracketResult<VoteReceipt> {
    let voter_id = normalize_voter(voter_id)?;
    let tournament_id = self.store.locate_matchup(matchup_id)?;
    self.store.transact(tournament_id, |record| {
      if voter_id.is_none() && record.require_login {
        return Err(BracketError::Unauthorized("Login required to vote".to_string()));
      }
      let window = record.voting_window;
      let (key, chosen) = {
        let matchup = record.matchup_by_id(matchup_id)?;
        ensure_votable(matchup, window)?;
        let chosen = matchup.slot_of(competitor_id).ok_or_else(|| {
          BracketError::invalid_input(format!("{competitor_id} is not competing in {}", matchup.label))
        })?;
        (matchup.key, chosen)
      };

      let book = Arc::make_mut(record.votes.entry(matchup_id).or_default());
      let change = match voter_id {
        Some(voter) => match book.named.get_mut(voter) {
          Some(existing) if existing.competitor_id == competitor_id => VoteChange::Unchanged,
          Some(existing) => {
            let from = mem::replace(&mut existing.competitor_id, competitor_id.to_string());
            existing.cast_at = now;
            VoteChange::Switched { from }
          }
          None => {
            book.named.insert(voter.to_string(), new_vote(matchup_id, Some(voter), competitor_id, now));
            VoteChange::Cast
          }
        },
        None => {
          book.anonymous.push(new_vote(matchup_id, None, competitor_id, now));
          VoteChange::Cast
        }
      };

      let matchup = record.matchup_mut(key)?;
      match &change {
        VoteChange::Cast => matchup.tallies[chosen.index()] += 1,
        VoteChange::Switched { from } => {
          let previous = matchup
            .slot_of(from)
            .ok_or_else(|| BracketError::storage(format!("vote references {from}, who is not in {}", matchup.label)))?;
          matchup.tallies[previous.index()] = matchup.tallies[previous.index()].saturating_sub(1);
          matchup.tallies[chosen.index()] += 1;
        }
        VoteChange::Unchanged | VoteChange::Removed => {}
      }
      debug!(
        "Vote on {} ({:?}): {}-{}",
        matchup.label, change, matchup.tallies[0], matchup.tallies[1]
      );
      Ok(VoteReceipt::new(matchup, competitor_id.to_string(), change))
    })
  }

  /// Withdraws a voter's vote. Anonymous votes cannot be withdrawn.
  pub fn remove(&self, matchup_id: MatchupId, voter_id: Option<&str>) -> BracketResult<VoteReceipt> {
    let Some(voter) = normalize_voter(voter_id)? else {
      return Err(BracketError::Unauthorized("Removing a vote requires a voter id".to_string()));
    };
    let tournament_id = self.store.locate_matchup(matchup_id)?;
    self.store.transact(tournament_id, |record| {
      let window = record.voting_window;
      let (key, label) = {
        let matchup = record.matchup_by_id(matchup_id)?;
        ensure_votable(matchup, window)?;
        (matchup.key, matchup.label.clone())
      };

      let book = Arc::make_mut(record.votes.entry(matchup_id).or_default());
      let removed = book
        .named
        .remove(voter)
        .ok_or_else(|| BracketError::not_found(format!("Vote by {voter} on {label}")))?;
      if book.is_empty() {
        record.votes.remove(&matchup_id);
      }

      let matchup = record.matchup_mut(key)?;
      let slot = matchup
        .slot_of(&removed.competitor_id)
        .ok_or_else(|| BracketError::storage(format!("vote references {}, who is not in {label}", removed.competitor_id)))?;
      matchup.tallies[slot.index()] = matchup.tallies[slot.index()].saturating_sub(1);
      debug!("Removed vote by {voter} on {label}: {}-{}", matchup.tallies[0], matchup.tallies[1]);
      Ok(VoteReceipt::new(matchup, removed.competitor_id, VoteChange::Removed))
    })
  }

  pub fn votes_for(&self, matchup_id: MatchupId) -> BracketResult<Vec<Vote>> {
    let tournament_id = self.store.locate_matchup(matchup_id)?;
    let record = self.store.load(tournament_id)?;
    record.matchup_by_id(matchup_id)?;
    Ok(
      record
        .votes_for(&matchup_id)
        .map(|book| book.iter().cloned().collect())
        .unwrap_or_default(),
    )
  }
}

fn normalize_voter(voter_id: Option<&str>) -> BracketResult<Option<&str>> {
  match voter_id {
    Some(raw) => {
      let trimmed = raw.trim();
      if trimmed.is_empty() {
        Err(BracketError::invalid_input("voter id must not be blank"))
      } else {
        Ok(Some(trimmed))
      }
    }
    None => Ok(None),
  }
}

fn ensure_votable(matchup: &Matchup, window: VotingWindow) -> BracketResult<()> {
  if matchup.is_decided() {
    return Err(BracketError::invalid_state("This matchup has already been decided"));
  }
  if !window.is_active {
    return Err(BracketError::invalid_state("Voting is not currently active"));
  }
  if !window.accepts(matchup.round()) {
    return Err(BracketError::invalid_state(format!(
      "Voting is active for Round {}, not Round {}",
      window.current_round.unwrap_or_default(),
      matchup.round()
    )));
  }
  if matchup.state() != MatchupState::Populated {
    return Err(BracketError::invalid_state(format!("{} is awaiting a competitor", matchup.label)));
  }
  Ok(())
}

fn new_vote(matchup_id: MatchupId, voter_id: Option<&str>, competitor_id: &str, now: DateTime<Utc>) -> Vote {
  Vote {
    id: Uuid::new_v4(),
    matchup_id,
    voter_id: voter_id.map(str::to_string),
    competitor_id: competitor_id.to_string(),
    cast_at: now,
  }
}
