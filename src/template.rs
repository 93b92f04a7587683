use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{BracketError, BracketResult};
use crate::types::{CompetitorId, MatchupKey, SlotIndex, MAX_ROUNDS};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSlot {
  pub competitor_id: CompetitorId,
  #[serde(default)]
  pub seed: Option<u32>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchupTemplate {
  pub id: String,
  pub position: u32,
  #[serde(default)]
  pub slot1: Option<TemplateSlot>,
  #[serde(default)]
  pub slot2: Option<TemplateSlot>,
}

impl MatchupTemplate {
  pub fn slot(&self, slot: SlotIndex) -> Option<&TemplateSlot> {
    match slot {
      SlotIndex::First => self.slot1.as_ref(),
      SlotIndex::Second => self.slot2.as_ref(),
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundTemplate {
  pub round_number: u32,
  pub matchups: Vec<MatchupTemplate>,
}

/// Static shape of a bracket, supplied by whoever seeds the tournament.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BracketTemplate {
  pub rounds: Vec<RoundTemplate>,
}

impl BracketTemplate {
  pub fn total_rounds(&self) -> u32 {
    self.rounds.len() as u32
  }

  pub fn round(&self, round_number: u32) -> Option<&RoundTemplate> {
    self.rounds.iter().find(|r| r.round_number == round_number)
  }

  pub fn matchup_at(&self, key: MatchupKey) -> Option<&MatchupTemplate> {
    self
      .round(key.round)
      .and_then(|r| r.matchups.iter().find(|m| m.position == key.position))
  }

  pub fn label_for(&self, key: MatchupKey) -> String {
    self
      .matchup_at(key)
      .map(|m| m.id.clone())
      .unwrap_or_else(|| key.default_label())
  }

  /// Number of matchups a round holds in a full single-elimination bracket.
  pub fn matchups_in_round(&self, round_number: u32) -> u32 {
    let total = self.total_rounds();
    if round_number == 0 || round_number > total {
      return 0;
    }
    1u32 << (total - round_number)
  }

  pub fn contains_key(&self, key: MatchupKey) -> bool {
    key.position < self.matchups_in_round(key.round)
  }

  pub fn seed_of(&self, competitor_id: &str) -> Option<u32> {
    let first = self.round(1)?;
    first
      .matchups
      .iter()
      .flat_map(|m| [m.slot1.as_ref(), m.slot2.as_ref()])
      .flatten()
      .find(|slot| slot.competitor_id == competitor_id)
      .and_then(|slot| slot.seed)
  }

  /// Sorts rounds and matchups, then checks the structure of a full
  /// single-elimination bracket.
  pub fn validated(mut self) -> BracketResult<Self> {
    self.rounds.sort_by_key(|r| r.round_number);
    for round in self.rounds.iter_mut() {
      round.matchups.sort_by_key(|m| m.position);
    }
    self.validate()?;
    Ok(self)
  }

  pub fn validate(&self) -> BracketResult<()> {
    if self.rounds.is_empty() {
      return Err(BracketError::invalid_input("template needs at least one round"));
    }
    let total = self.total_rounds();
    if total > MAX_ROUNDS {
      return Err(BracketError::invalid_input(format!(
        "template has {total} rounds; at most {MAX_ROUNDS} are supported"
      )));
    }

    let mut matchup_ids = HashSet::new();
    for (idx, round) in self.rounds.iter().enumerate() {
      let expected_number = idx as u32 + 1;
      if round.round_number != expected_number {
        return Err(BracketError::invalid_input(format!(
          "rounds must be numbered 1..={total} without gaps; found round {}",
          round.round_number
        )));
      }
      let expected_count = self.matchups_in_round(expected_number);
      if round.matchups.len() as u32 != expected_count {
        return Err(BracketError::invalid_input(format!(
          "round {expected_number} needs {expected_count} matchups, got {}",
          round.matchups.len()
        )));
      }
      let mut positions = round.matchups.iter().map(|m| m.position).collect::<Vec<_>>();
      positions.sort_unstable();
      if positions.iter().enumerate().any(|(i, p)| *p != i as u32) {
        return Err(BracketError::invalid_input(format!(
          "round {expected_number} positions must cover 0..{expected_count} exactly once"
        )));
      }
      for matchup in &round.matchups {
        let id = matchup.id.trim();
        if id.is_empty() {
          return Err(BracketError::invalid_input(format!(
            "round {expected_number} position {} has a blank matchup id",
            matchup.position
          )));
        }
        if !matchup_ids.insert(id.to_string()) {
          return Err(BracketError::invalid_input(format!("duplicate matchup id {id}")));
        }
        if expected_number > 1 && (matchup.slot1.is_some() || matchup.slot2.is_some()) {
          return Err(BracketError::invalid_input(format!(
            "matchup {id} in round {expected_number} is seeded; later rounds fill by advancement"
          )));
        }
      }
    }

    let mut competitors = HashSet::new();
    for matchup in &self.rounds[0].matchups {
      for slot in [SlotIndex::First, SlotIndex::Second] {
        let Some(entry) = matchup.slot(slot) else {
          return Err(BracketError::invalid_input(format!(
            "round 1 matchup {} is missing a competitor",
            matchup.id
          )));
        };
        let competitor = entry.competitor_id.trim();
        if competitor.is_empty() {
          return Err(BracketError::invalid_input(format!(
            "round 1 matchup {} has a blank competitor id",
            matchup.id
          )));
        }
        if !competitors.insert(competitor.to_string()) {
          return Err(BracketError::invalid_input(format!(
            "competitor {competitor} is seeded more than once"
          )));
        }
      }
    }
    Ok(())
  }
}
