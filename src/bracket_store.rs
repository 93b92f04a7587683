use crate::error::{BracketError, BracketResult};
use crate::types::{CompetitorId, Matchup, MatchupId, MatchupKey, SlotIndex, TournamentRecord};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotUpsert {
  Created,
  Filled,
  Unchanged,
}

impl TournamentRecord {
  /// Persists the round-one matchups described by the template.
  pub fn initialize_bracket(&mut self) -> BracketResult<usize> {
    if !self.matchups.is_empty() {
      return Err(BracketError::Conflict(format!(
        "Bracket for tournament {} is already initialized",
        self.id
      )));
    }
    self.template.validate()?;
    let first_round = self
      .template
      .round(1)
      .ok_or_else(|| BracketError::invalid_input("template has no round 1"))?;

    let matchups = first_round
      .matchups
      .iter()
      .map(|entry| {
        let mut matchup = Matchup::new(self.id, MatchupKey::new(1, entry.position), entry.id.clone());
        matchup.slots = [
          entry.slot1.as_ref().map(|s| s.competitor_id.clone()),
          entry.slot2.as_ref().map(|s| s.competitor_id.clone()),
        ];
        matchup
      })
      .collect::<Vec<_>>();
    let created = matchups.len();
    self.matchups = matchups;
    self.matchups.sort_by_key(|m| m.key);
    Ok(created)
  }

  fn matchup_index(&self, key: MatchupKey) -> Result<usize, usize> {
    self.matchups.binary_search_by_key(&key, |m| m.key)
  }

  pub fn matchup(&self, key: MatchupKey) -> BracketResult<&Matchup> {
    self
      .matchup_index(key)
      .map(|idx| &self.matchups[idx])
      .map_err(|_| missing_matchup(key))
  }

  pub fn matchup_mut(&mut self, key: MatchupKey) -> BracketResult<&mut Matchup> {
    match self.matchup_index(key) {
      Ok(idx) => Ok(&mut self.matchups[idx]),
      Err(_) => Err(missing_matchup(key)),
    }
  }

  pub fn matchup_by_id(&self, id: MatchupId) -> BracketResult<&Matchup> {
    self
      .matchups
      .iter()
      .find(|m| m.id == id)
      .ok_or_else(|| BracketError::not_found(format!("Matchup {id}")))
  }

  /// Matchups of a round in position order; empty until the round is reached.
  pub fn list_round(&self, round: u32) -> Vec<&Matchup> {
    self.matchups.iter().filter(|m| m.round() == round).collect()
  }

  /// Creates the matchup at `key` if needed and places `competitor_id` in `slot`.
  /// Tallies, the other slot and the winner are never touched.
  pub fn upsert_slot(
    &mut self,
    key: MatchupKey,
    slot: SlotIndex,
    competitor_id: &CompetitorId,
  ) -> BracketResult<SlotUpsert> {
    if !self.template.contains_key(key) {
      return Err(BracketError::invalid_input(format!(
        "round {} position {} is outside the bracket",
        key.round, key.position
      )));
    }
    match self.matchup_index(key) {
      Ok(idx) => {
        let matchup = &mut self.matchups[idx];
        match matchup.competitor(slot) {
          Some(existing) if existing == competitor_id => Ok(SlotUpsert::Unchanged),
          Some(existing) => Err(BracketError::invalid_state(format!(
            "{} slot {} already holds {existing}",
            matchup.label,
            slot.index() + 1
          ))),
          None => {
            matchup.slots[slot.index()] = Some(competitor_id.clone());
            Ok(SlotUpsert::Filled)
          }
        }
      }
      Err(insert_at) => {
        let mut matchup = Matchup::new(self.id, key, self.template.label_for(key));
        matchup.slots[slot.index()] = Some(competitor_id.clone());
        self.matchups.insert(insert_at, matchup);
        Ok(SlotUpsert::Created)
      }
    }
  }
}

fn missing_matchup(key: MatchupKey) -> BracketError {
  BracketError::not_found(format!("Matchup at round {} position {}", key.round, key.position))
}
