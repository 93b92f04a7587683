use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::error::BracketResult;
use crate::storage::Storage;
use crate::template::TemplateSlot;
use crate::types::{
    CompetitorId, Matchup, MatchupId, MatchupKey, SlotIndex, TournamentId, TournamentRecord, TournamentStatus,
    VotingWindow,
};

// ── Public bracket view ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    pub competitor_id: CompetitorId,
    pub seed: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchupView {
    /// Template entry id.
    pub id: String,
    /// Persisted matchup, once the round has been reached.
    pub matchup_id: Option<MatchupId>,
    pub position: u32,
    pub slot1: Option<SlotView>,
    pub slot2: Option<SlotView>,
    pub tally1: u32,
    pub tally2: u32,
    pub winner_competitor_id: Option<CompetitorId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundView {
    pub round_number: u32,
    pub round_name: String,
    pub matchups: Vec<MatchupView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentView {
    pub tournament_id: TournamentId,
    pub name: String,
    pub status: TournamentStatus,
    pub current_round: u32,
    pub total_rounds: u32,
    pub champion: Option<CompetitorId>,
    pub rounds: Vec<RoundView>,
    pub voting_window: VotingWindow,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

// ── Owner console ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleMatchup {
    pub matchup_id: MatchupId,
    pub label: String,
    pub position: u32,
    pub competitor1: Option<CompetitorId>,
    pub competitor2: Option<CompetitorId>,
    pub votes1: u32,
    pub votes2: u32,
    pub winner_id: Option<CompetitorId>,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleRound {
    pub round_number: u32,
    pub round_name: String,
    pub matchups: Vec<ConsoleMatchup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleView {
    pub current_round: u32,
    pub total_rounds: u32,
    pub is_complete: bool,
    pub champion: Option<CompetitorId>,
    pub voting_window: VotingWindow,
    pub rounds: Vec<ConsoleRound>,
}

/// Display name by distance from the final round.
pub fn round_name(round_number: u32, total_rounds: u32) -> String {
    match total_rounds.saturating_sub(round_number) {
        0 => "Finals".to_string(),
        1 => "Semi-Finals".to_string(),
        2 => "Quarter-Finals".to_string(),
        3 => "Round of 16".to_string(),
        _ => format!("Round {round_number}"),
    }
}

/// Lowest round that still has a persisted, undecided matchup.
fn first_open_round(record: &TournamentRecord) -> Option<u32> {
    record.matchups.iter().filter(|m| !m.is_decided()).map(Matchup::round).min()
}

pub struct TournamentQuery<S> {
    store: Arc<S>,
}

impl<S> Clone for TournamentQuery<S> {
    fn clone(&self) -> Self {
        TournamentQuery { store: self.store.clone() }
    }
}

impl<S: Storage> TournamentQuery<S> {
    pub fn new(store: Arc<S>) -> Self {
        TournamentQuery { store }
    }

    pub fn get_view(&self, tournament_id: TournamentId, now: DateTime<Utc>) -> BracketResult<TournamentView> {
        let record = self.store.load(tournament_id)?;
        Ok(build_view(&record, now))
    }

    pub fn get_console(&self, tournament_id: TournamentId) -> BracketResult<ConsoleView> {
        let record = self.store.load(tournament_id)?;
        Ok(build_console(&record))
    }
}

pub fn build_view(record: &TournamentRecord, now: DateTime<Utc>) -> TournamentView {
    let total_rounds = record.total_rounds();
    let status = record.status_at(now);
    let current_round = if status == TournamentStatus::Completed {
        total_rounds
    } else {
        first_open_round(record).unwrap_or(1)
    };

    let rounds = record
        .template
        .rounds
        .iter()
        .map(|round| RoundView {
            round_number: round.round_number,
            round_name: round_name(round.round_number, total_rounds),
            matchups: round
                .matchups
                .iter()
                .map(|entry| {
                    let key = MatchupKey::new(round.round_number, entry.position);
                    let persisted = record.matchup(key).ok();
                    let slot_view = |slot: SlotIndex| match persisted {
                        Some(matchup) => matchup.competitor(slot).map(|competitor_id| SlotView {
                            competitor_id: competitor_id.clone(),
                            seed: record.template.seed_of(competitor_id),
                        }),
                        None => entry.slot(slot).map(template_slot_view),
                    };
                    MatchupView {
                        id: entry.id.clone(),
                        matchup_id: persisted.map(|m| m.id),
                        position: entry.position,
                        slot1: slot_view(SlotIndex::First),
                        slot2: slot_view(SlotIndex::Second),
                        tally1: persisted.map(|m| m.tallies[0]).unwrap_or(0),
                        tally2: persisted.map(|m| m.tallies[1]).unwrap_or(0),
                        winner_competitor_id: persisted.and_then(|m| m.winner.clone()),
                    }
                })
                .collect(),
        })
        .collect();

    TournamentView {
        tournament_id: record.id,
        name: record.name.clone(),
        status,
        current_round,
        total_rounds,
        champion: record.champion().cloned(),
        rounds,
        voting_window: record.voting_window,
        starts_at: record.starts_at,
        ends_at: record.ends_at,
    }
}

fn template_slot_view(slot: &TemplateSlot) -> SlotView {
    SlotView { competitor_id: slot.competitor_id.clone(), seed: slot.seed }
}

pub fn build_console(record: &TournamentRecord) -> ConsoleView {
    let total_rounds = record.total_rounds();
    let champion = record.champion().cloned();
    let current_round = first_open_round(record).unwrap_or(total_rounds);

    let mut rounds: Vec<ConsoleRound> = Vec::new();
    for matchup in &record.matchups {
        let entry = ConsoleMatchup {
            matchup_id: matchup.id,
            label: matchup.label.clone(),
            position: matchup.position(),
            competitor1: matchup.slots[0].clone(),
            competitor2: matchup.slots[1].clone(),
            votes1: matchup.tallies[0],
            votes2: matchup.tallies[1],
            winner_id: matchup.winner.clone(),
            completed: matchup.completed_at.is_some(),
        };
        // Matchups are kept sorted by round, so a new round always starts at the end.
        match rounds.last_mut() {
            Some(round) if round.round_number == matchup.round() => round.matchups.push(entry),
            _ => rounds.push(ConsoleRound {
                round_number: matchup.round(),
                round_name: round_name(matchup.round(), total_rounds),
                matchups: vec![entry],
            }),
        }
    }

    ConsoleView {
        current_round,
        total_rounds,
        is_complete: champion.is_some(),
        champion,
        voting_window: record.voting_window,
        rounds,
    }
}
