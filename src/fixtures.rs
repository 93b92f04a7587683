//! Bracket builders shared by unit tests.

use chrono::{Duration, TimeZone, Utc};
use uuid::Uuid;

use crate::template::{BracketTemplate, MatchupTemplate, RoundTemplate, TemplateSlot};
use crate::types::{NewTournament, TournamentRecord, VotingWindow};

pub const OWNER: &str = "owner-1";

/// Full bracket pairing competitors in order: (c0 vs c1), (c2 vs c3), ...
pub fn template_for(competitors: &[&str]) -> BracketTemplate {
    let mut rounds = Vec::new();
    let mut count = competitors.len() / 2;
    let mut round_number = 1u32;
    while count >= 1 {
        let matchups = (0..count)
            .map(|position| {
                let (slot1, slot2) = if round_number == 1 {
                    (
                        Some(TemplateSlot {
                            competitor_id: competitors[position * 2].to_string(),
                            seed: Some(position as u32 * 2 + 1),
                        }),
                        Some(TemplateSlot {
                            competitor_id: competitors[position * 2 + 1].to_string(),
                            seed: Some(position as u32 * 2 + 2),
                        }),
                    )
                } else {
                    (None, None)
                };
                MatchupTemplate {
                    id: format!("r{round_number}-m{}", position + 1),
                    position: position as u32,
                    slot1,
                    slot2,
                }
            })
            .collect();
        rounds.push(RoundTemplate { round_number, matchups });
        count /= 2;
        round_number += 1;
    }
    BracketTemplate { rounds }
}

pub fn new_tournament(competitors: &[&str]) -> NewTournament {
    let starts_at = Utc.with_ymd_and_hms(2026, 5, 1, 18, 0, 0).unwrap();
    NewTournament {
        id: None,
        name: "Spring Shorts".to_string(),
        owner_id: OWNER.to_string(),
        starts_at,
        ends_at: starts_at + Duration::days(7),
        require_login: false,
        template: template_for(competitors),
    }
}

pub fn record_for(competitors: &[&str]) -> TournamentRecord {
    let request = new_tournament(competitors);
    let mut record = TournamentRecord {
        id: Uuid::new_v4(),
        name: request.name,
        owner_id: request.owner_id,
        starts_at: request.starts_at,
        ends_at: request.ends_at,
        require_login: request.require_login,
        created_at: request.starts_at - Duration::days(1),
        template: request.template,
        voting_window: VotingWindow::closed(),
        matchups: Vec::new(),
        votes: Default::default(),
    };
    record.initialize_bracket().unwrap();
    record
}

pub fn four_entrant_record() -> TournamentRecord {
    record_for(&["a", "b", "c", "d"])
}

pub fn eight_entrant_record() -> TournamentRecord {
    record_for(&["a", "b", "c", "d", "e", "f", "g", "h"])
}
