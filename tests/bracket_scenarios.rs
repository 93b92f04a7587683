//! End-to-end bracket scenarios driven through the public service API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use bracket_engine::advancement::{AdvanceStatus, FixedTieBreaker};
use bracket_engine::service::BracketService;
use bracket_engine::storage::{Storage, TournamentStore};
use bracket_engine::template::{BracketTemplate, MatchupTemplate, RoundTemplate, TemplateSlot};
use bracket_engine::types::{MatchupId, MatchupKey, NewTournament, SlotIndex, TournamentId, VotingWindow};
use bracket_engine::ErrorKind;
use chrono::{Duration, Utc};

const OWNER: &str = "organizer";

fn bracket(competitors: &[&str]) -> BracketTemplate {
    let mut rounds = Vec::new();
    let mut count = competitors.len() / 2;
    let mut round_number = 1;
    while count >= 1 {
        let matchups = (0..count)
            .map(|position| {
                let seeded = |offset: usize| {
                    (round_number == 1).then(|| TemplateSlot {
                        competitor_id: competitors[position * 2 + offset].to_string(),
                        seed: Some((position * 2 + offset + 1) as u32),
                    })
                };
                MatchupTemplate {
                    id: format!("r{round_number}-m{}", position + 1),
                    position: position as u32,
                    slot1: seeded(0),
                    slot2: seeded(1),
                }
            })
            .collect();
        rounds.push(RoundTemplate { round_number, matchups });
        count /= 2;
        round_number += 1;
    }
    BracketTemplate { rounds }
}

struct Harness {
    service: BracketService<TournamentStore>,
    id: TournamentId,
}

impl Harness {
    fn new(competitors: &[&str], strict: bool, tie: SlotIndex) -> Self {
        Self::with_store(TournamentStore::in_memory(), competitors, strict, tie)
    }

    fn with_store(store: TournamentStore, competitors: &[&str], strict: bool, tie: SlotIndex) -> Self {
        let service = BracketService::new(Arc::new(store), Arc::new(FixedTieBreaker(tie)), strict);
        let now = Utc::now();
        let request = NewTournament {
            id: None,
            name: "Midnight Shorts".to_string(),
            owner_id: OWNER.to_string(),
            starts_at: now - Duration::days(1),
            ends_at: now + Duration::days(6),
            require_login: false,
            template: bracket(competitors),
        };
        let id = service.create_tournament(request, now).unwrap().tournament_id;
        Harness { service, id }
    }

    fn matchup_id(&self, round: u32, position: u32) -> MatchupId {
        let record = self.service.store().load(self.id).unwrap();
        record.matchup(MatchupKey::new(round, position)).unwrap().id
    }

    fn open(&self, round: u32) {
        self.service.open_voting(self.id, round, Some(OWNER)).unwrap();
    }

    /// Casts `votes` fresh named votes for `competitor`.
    fn vote(&self, matchup_id: MatchupId, competitor: &str, votes: usize) {
        for n in 0..votes {
            let voter = format!("{competitor}-fan-{n}");
            self.service.cast_vote(matchup_id, Some(&voter), competitor, Utc::now()).unwrap();
        }
    }

    fn assert_tallies_match_votes(&self) {
        let record = self.service.store().load(self.id).unwrap();
        for matchup in &record.matchups {
            let recorded = record.votes_for(&matchup.id).map(|book| book.len()).unwrap_or(0);
            assert_eq!(matchup.total_votes() as usize, recorded, "{}", matchup.label);
            for slot in [SlotIndex::First, SlotIndex::Second] {
                if let Some(competitor) = matchup.competitor(slot) {
                    let counted = record.votes_for(&matchup.id).map(|b| b.count_for(competitor)).unwrap_or(0);
                    assert_eq!(matchup.tally(slot) as usize, counted, "{} {competitor}", matchup.label);
                }
            }
        }
    }
}

#[test]
fn test_closing_round_one_seeds_the_final() {
    let h = Harness::new(&["A", "B", "C", "D"], false, SlotIndex::First);
    let (m0, m1) = (h.matchup_id(1, 0), h.matchup_id(1, 1));
    h.open(1);
    h.vote(m0, "A", 3);
    h.vote(m0, "B", 1);
    h.vote(m1, "D", 2);

    let closed = h.service.close_voting(h.id, Some(OWNER), Utc::now()).unwrap();
    assert_eq!(closed.report.advanced(), 2);

    let record = h.service.store().load(h.id).unwrap();
    assert_eq!(record.matchup(MatchupKey::new(1, 0)).unwrap().winner.as_deref(), Some("A"));
    assert_eq!(record.matchup(MatchupKey::new(1, 1)).unwrap().winner.as_deref(), Some("D"));
    let final_match = record.matchup(MatchupKey::new(2, 0)).unwrap();
    assert_eq!(final_match.slots, [Some("A".to_string()), Some("D".to_string())]);
    assert_eq!(final_match.tallies, [0, 0]);
    assert_eq!(record.voting_window, VotingWindow::closed());
    h.assert_tallies_match_votes();
}

#[test]
fn test_switching_moves_the_single_vote() {
    let h = Harness::new(&["A", "B", "C", "D"], false, SlotIndex::First);
    let m0 = h.matchup_id(1, 0);
    h.open(1);

    let receipt = h.service.cast_vote(m0, Some("viewer"), "A", Utc::now()).unwrap();
    assert_eq!((receipt.tally1, receipt.tally2), (1, 0));
    let receipt = h.service.cast_vote(m0, Some("viewer"), "B", Utc::now()).unwrap();
    assert_eq!((receipt.tally1, receipt.tally2), (0, 1));

    let votes = h.service.votes_for(m0).unwrap();
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].voter_id.as_deref(), Some("viewer"));
    assert_eq!(votes[0].competitor_id, "B");
    h.assert_tallies_match_votes();
}

#[test]
fn test_removing_a_vote_twice() {
    let h = Harness::new(&["A", "B", "C", "D"], false, SlotIndex::First);
    let m0 = h.matchup_id(1, 0);
    h.open(1);
    h.service.cast_vote(m0, Some("viewer"), "A", Utc::now()).unwrap();

    let receipt = h.service.remove_vote(m0, Some("viewer")).unwrap();
    assert_eq!((receipt.tally1, receipt.tally2), (0, 0));
    assert!(h.service.votes_for(m0).unwrap().is_empty());
    assert_eq!(h.service.remove_vote(m0, Some("viewer")).unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn test_round_order_policy() {
    for strict in [false, true] {
        let h = Harness::new(&["A", "B", "C", "D", "E", "F", "G", "H"], strict, SlotIndex::First);
        h.open(1);
        h.vote(h.matchup_id(1, 0), "A", 2);
        h.service.close_voting(h.id, Some(OWNER), Utc::now()).unwrap();

        let opened = h.service.open_voting(h.id, 2, Some(OWNER));
        if strict {
            assert_eq!(opened.unwrap_err().kind(), ErrorKind::InvalidState);
        } else {
            assert_eq!(opened.unwrap(), VotingWindow::open_for(2));
            // A waits in r2-m1 for an opponent that does not exist yet.
            let semi = h.matchup_id(2, 0);
            let err = h.service.cast_vote(semi, Some("early-fan"), "A", Utc::now()).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidState);
            assert!(h.service.votes_for(semi).unwrap().is_empty());
        }
    }
}

#[test]
fn test_ties_in_final_and_earlier_rounds() {
    let h = Harness::new(&["A", "B", "C", "D"], false, SlotIndex::Second);
    let (m0, m1) = (h.matchup_id(1, 0), h.matchup_id(1, 1));
    h.open(1);
    h.vote(m0, "A", 1);
    h.vote(m1, "C", 2);
    h.vote(m1, "D", 2);
    let closed = h.service.close_voting(h.id, Some(OWNER), Utc::now()).unwrap();
    assert_eq!(closed.report.outcomes[1].status, AdvanceStatus::Tie);

    let record = h.service.store().load(h.id).unwrap();
    assert_eq!(record.matchup(MatchupKey::new(1, 1)).unwrap().winner, None);
    assert_eq!(record.matchup(MatchupKey::new(2, 0)).unwrap().slots, [Some("A".to_string()), None]);

    // Break the semi-final tie with one more vote, then tie the final.
    h.open(1);
    h.service.cast_vote(m1, Some("late-voter"), "C", Utc::now()).unwrap();
    h.service.close_voting(h.id, Some(OWNER), Utc::now()).unwrap();

    let final_id = h.matchup_id(2, 0);
    h.open(2);
    h.vote(final_id, "A", 4);
    h.vote(final_id, "C", 4);
    let closed = h.service.close_voting(h.id, Some(OWNER), Utc::now()).unwrap();
    assert_eq!(closed.report.champion.as_deref(), Some("C"));
    assert!(matches!(closed.report.outcomes[0].status, AdvanceStatus::Advanced { tie_broken: true, .. }));
    assert_eq!(h.service.view(h.id, Utc::now()).unwrap().champion.as_deref(), Some("C"));
}

#[test]
fn test_advance_round_twice_changes_nothing() {
    let h = Harness::new(&["A", "B", "C", "D"], false, SlotIndex::First);
    h.open(1);
    h.vote(h.matchup_id(1, 0), "B", 2);
    h.vote(h.matchup_id(1, 1), "C", 1);
    h.service.close_voting(h.id, Some(OWNER), Utc::now()).unwrap();
    let before = h.service.store().load(h.id).unwrap();

    let report = h.service.advance_round(h.id, 1, Some(OWNER), Utc::now()).unwrap();
    assert!(report
        .outcomes
        .iter()
        .all(|o| matches!(o.status, AdvanceStatus::AlreadyAdvanced { .. })));
    assert_eq!(h.service.store().load(h.id).unwrap(), before);
}

#[test]
fn test_decided_matchup_is_frozen() {
    let h = Harness::new(&["A", "B", "C", "D"], false, SlotIndex::First);
    let m0 = h.matchup_id(1, 0);
    h.service.advance_matchup(m0, Some("B"), Some(OWNER), Utc::now()).unwrap();

    h.open(1);
    let err = h.service.cast_vote(m0, Some("viewer"), "A", Utc::now()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    let err = h.service.advance_matchup(m0, Some("A"), Some(OWNER), Utc::now()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let record = h.service.store().load(h.id).unwrap();
    assert_eq!(record.matchup(MatchupKey::new(1, 0)).unwrap().winner.as_deref(), Some("B"));
}

#[test]
fn test_votes_rejected_outside_open_round() {
    let h = Harness::new(&["A", "B", "C", "D"], false, SlotIndex::First);
    let m0 = h.matchup_id(1, 0);
    let err = h.service.cast_vote(m0, Some("early"), "A", Utc::now()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert!(h.service.votes_for(m0).unwrap().is_empty());
}

#[test]
fn test_concurrent_switches_keep_tallies_consistent() {
    let h = Arc::new(Harness::new(&["A", "B", "C", "D"], false, SlotIndex::First));
    let m0 = h.matchup_id(1, 0);
    h.open(1);

    let workers = (0..16)
        .map(|worker| {
            let h = h.clone();
            thread::spawn(move || {
                let voter = format!("voter-{worker}");
                for round_trip in 0..25 {
                    let pick = if (worker + round_trip) % 2 == 0 { "A" } else { "B" };
                    h.service.cast_vote(m0, Some(&voter), pick, Utc::now()).unwrap();
                    if round_trip % 7 == 0 {
                        h.service.cast_vote(m0, None, pick, Utc::now()).unwrap();
                    }
                }
            })
        })
        .collect::<Vec<_>>();
    for worker in workers {
        worker.join().unwrap();
    }

    let record = h.service.store().load(h.id).unwrap();
    let matchup = record.matchup(MatchupKey::new(1, 0)).unwrap();
    assert_eq!(matchup.total_votes(), 16 + 16 * 4);
    h.assert_tallies_match_votes();
}

#[test]
fn test_votes_racing_close_are_counted_or_rejected() {
    let h = Arc::new(Harness::new(&["A", "B", "C", "D"], false, SlotIndex::First));
    let m0 = h.matchup_id(1, 0);
    h.open(1);
    h.vote(m0, "A", 3);

    let accepted = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(9));
    let workers = (0..8)
        .map(|worker| {
            let (h, accepted, start) = (h.clone(), accepted.clone(), start.clone());
            thread::spawn(move || {
                start.wait();
                for n in 0..10_000 {
                    let voter = format!("racer-{worker}-{n}");
                    match h.service.cast_vote(m0, Some(&voter), "A", Utc::now()) {
                        Ok(_) => {
                            accepted.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(err) => return Some(err.kind()),
                    }
                }
                None
            })
        })
        .collect::<Vec<_>>();

    start.wait();
    while accepted.load(Ordering::SeqCst) < 8 {
        thread::yield_now();
    }
    let closed = h.service.close_voting(h.id, Some(OWNER), Utc::now()).unwrap();

    for worker in workers {
        assert_eq!(worker.join().unwrap(), Some(ErrorKind::InvalidState));
    }
    let accepted = accepted.load(Ordering::SeqCst);
    assert_eq!(closed.report.outcomes[0].status.winner_id().map(String::as_str), Some("A"));

    let record = h.service.store().load(h.id).unwrap();
    let matchup = record.matchup(MatchupKey::new(1, 0)).unwrap();
    assert_eq!(matchup.tallies, [3 + accepted as u32, 0]);
    assert_eq!(h.service.votes_for(m0).unwrap().len(), 3 + accepted);
    h.assert_tallies_match_votes();

    let err = h.service.cast_vote(m0, Some("too-late"), "A", Utc::now()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn test_file_backed_tournament_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let (id, m0) = {
        let h = Harness::with_store(
            TournamentStore::open(dir.path()).unwrap(),
            &["A", "B", "C", "D"],
            false,
            SlotIndex::First,
        );
        h.open(1);
        h.vote(h.matchup_id(1, 0), "A", 2);
        (h.id, h.matchup_id(1, 0))
    };

    let service = BracketService::new(
        Arc::new(TournamentStore::open(dir.path()).unwrap()),
        Arc::new(FixedTieBreaker(SlotIndex::First)),
        false,
    );
    assert_eq!(service.votes_for(m0).unwrap().len(), 2);
    service.cast_vote(m0, Some("after-restart"), "B", Utc::now()).unwrap();
    let closed = service.close_voting(id, Some(OWNER), Utc::now()).unwrap();
    assert_eq!(closed.report.outcomes[0].status.winner_id().map(String::as_str), Some("A"));
}
