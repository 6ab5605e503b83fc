// Double round-robin fixture generation (circle method).
//
// With M slots (the club count, plus one bye slot when the count is odd) the
// first slot stays fixed and the other M-1 rotate one position per step. Each
// step pairs slot i with slot M-1-i; each pair yields a first-leg fixture in
// round r+1 and a reversed second-leg fixture in round r+1+(M-1). Pairings
// against the bye produce nothing and that club rests for the round.

use std::collections::HashSet;

use chrono::{Duration, NaiveDate};
use tracing::debug;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{ClubId, Fixture, LeagueId};

/// Placeholder dates for generated rounds. Real kick-off scheduling happens
/// elsewhere; this only spaces the rounds out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundCalendar {
    pub start_date: NaiveDate,
    pub days_between_rounds: u32,
}

impl RoundCalendar {
    pub fn new(start_date: NaiveDate, days_between_rounds: u32) -> Self {
        RoundCalendar {
            start_date,
            days_between_rounds,
        }
    }

    /// Date of a 1-based round.
    pub fn date_for_round(&self, round: u32) -> NaiveDate {
        let offset = i64::from(round.saturating_sub(1)) * i64::from(self.days_between_rounds);
        self.start_date + Duration::days(offset)
    }
}

/// A single home/away pairing before it becomes a stored fixture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pairing {
    pub round: u32,
    pub home: ClubId,
    pub away: ClubId,
}

/// Number of rounds a double round-robin over `club_count` clubs needs.
pub fn round_count(club_count: usize) -> u32 {
    if club_count < 2 {
        return 0;
    }
    let slots = club_count + club_count % 2;
    (2 * (slots - 1)) as u32
}

/// Produce the ordered pairings for a double round-robin.
///
/// Fails with `Validation` for fewer than two clubs or a repeated club ID.
pub fn pairings(club_ids: &[ClubId]) -> Result<Vec<Pairing>> {
    if club_ids.len() < 2 {
        return Err(Error::validation(format!(
            "fixture generation needs at least 2 clubs, got {}",
            club_ids.len()
        )));
    }

    let mut seen = HashSet::new();
    if let Some(dup) = club_ids.iter().find(|id| !seen.insert(id.as_str())) {
        return Err(Error::validation(format!(
            "club {dup} appears more than once in the fixture list"
        )));
    }

    // `None` is the bye slot.
    let mut slots: Vec<Option<&ClubId>> = club_ids.iter().map(Some).collect();
    if slots.len() % 2 == 1 {
        slots.push(None);
    }

    let m = slots.len();
    let steps = m - 1;
    let mut first_leg = Vec::with_capacity(club_ids.len() * (club_ids.len() - 1) / 2);

    for step in 0..steps {
        for i in 0..m / 2 {
            let home = slots[rotated_index(i, step, m)];
            let away = slots[rotated_index(m - 1 - i, step, m)];
            if let (Some(home), Some(away)) = (home, away) {
                first_leg.push(Pairing {
                    round: step as u32 + 1,
                    home: home.clone(),
                    away: away.clone(),
                });
            }
        }
    }

    let second_leg: Vec<Pairing> = first_leg
        .iter()
        .map(|p| Pairing {
            round: p.round + steps as u32,
            home: p.away.clone(),
            away: p.home.clone(),
        })
        .collect();

    let mut all = first_leg;
    all.extend(second_leg);
    Ok(all)
}

/// Slot index occupying `position` after `step` rotations. Position 0 never
/// moves; the others shift one place to the right each step.
fn rotated_index(position: usize, step: usize, slot_count: usize) -> usize {
    if position == 0 {
        return 0;
    }
    let ring = slot_count - 1;
    1 + (position - 1 + ring - step % ring) % ring
}

/// Generate the full fixture set for a league.
///
/// Every fixture gets a fresh UUID, `Scheduled` status and the placeholder
/// date of its round.
pub fn generate(
    league_id: &LeagueId,
    club_ids: &[ClubId],
    calendar: &RoundCalendar,
) -> Result<Vec<Fixture>> {
    let pairings = pairings(club_ids)?;

    let fixtures: Vec<Fixture> = pairings
        .into_iter()
        .map(|p| {
            Fixture::scheduled(
                Uuid::new_v4().to_string(),
                league_id.clone(),
                p.round,
                p.home,
                p.away,
                calendar.date_for_round(p.round),
            )
        })
        .collect();

    debug!(
        "Generated {} fixtures over {} rounds for league {} ({} clubs)",
        fixtures.len(),
        round_count(club_ids.len()),
        league_id,
        club_ids.len()
    );

    Ok(fixtures)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn clubs(n: usize) -> Vec<ClubId> {
        (0..n).map(|i| format!("club_{i}")).collect()
    }

    fn calendar() -> RoundCalendar {
        RoundCalendar::new(NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(), 7)
    }

    fn league() -> LeagueId {
        "league_1".to_string()
    }

    // ------------------------------------------------------------------
    // Input validation
    // ------------------------------------------------------------------

    #[test]
    fn fewer_than_two_clubs_is_rejected() {
        assert!(matches!(
            generate(&league(), &[], &calendar()),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            generate(&league(), &clubs(1), &calendar()),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn duplicate_club_is_rejected() {
        let ids = vec!["A".to_string(), "B".to_string(), "A".to_string()];
        assert!(matches!(pairings(&ids), Err(Error::Validation(_))));
    }

    // ------------------------------------------------------------------
    // Even club counts
    // ------------------------------------------------------------------

    #[test]
    fn four_clubs_yield_twelve_fixtures_over_six_rounds() {
        let ids: Vec<ClubId> = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
        let fixtures = generate(&league(), &ids, &calendar()).unwrap();

        assert_eq!(fixtures.len(), 12);
        let rounds: HashSet<u32> = fixtures.iter().map(|f| f.round).collect();
        assert_eq!(rounds, (1..=6).collect());
        for id in &ids {
            assert_eq!(fixtures.iter().filter(|f| f.involves(id)).count(), 6);
        }
    }

    #[test]
    fn every_pair_meets_twice_with_reversed_venue() {
        for n in [2, 4, 6, 8, 10] {
            let ids = clubs(n);
            let p = pairings(&ids).unwrap();
            assert_eq!(p.len(), n * (n - 1), "n = {n}");

            let mut meetings: HashMap<(ClubId, ClubId), usize> = HashMap::new();
            for pairing in &p {
                assert_ne!(pairing.home, pairing.away);
                *meetings
                    .entry((pairing.home.clone(), pairing.away.clone()))
                    .or_default() += 1;
            }
            for a in &ids {
                for b in &ids {
                    if a != b {
                        assert_eq!(meetings.get(&(a.clone(), b.clone())), Some(&1), "{a} v {b}");
                    }
                }
                assert_eq!(p.iter().filter(|x| &x.home == a || &x.away == a).count(), 2 * (n - 1));
            }
        }
    }

    #[test]
    fn each_club_plays_once_per_round_when_even() {
        let ids = clubs(6);
        let p = pairings(&ids).unwrap();
        for round in 1..=round_count(6) {
            let in_round: Vec<&Pairing> = p.iter().filter(|x| x.round == round).collect();
            assert_eq!(in_round.len(), 3, "round {round}");
            let mut playing = HashSet::new();
            for x in in_round {
                assert!(playing.insert(&x.home));
                assert!(playing.insert(&x.away));
            }
        }
    }

    #[test]
    fn second_leg_mirrors_first_leg() {
        let ids = clubs(4);
        let p = pairings(&ids).unwrap();
        let steps = 3;
        for first in p.iter().filter(|x| x.round <= steps) {
            assert!(p.iter().any(|second| second.round == first.round + steps
                && second.home == first.away
                && second.away == first.home));
        }
    }

    #[test]
    fn first_round_pairs_opposite_positions() {
        let ids: Vec<ClubId> = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
        let p = pairings(&ids).unwrap();
        let round_one: Vec<(&str, &str)> = p
            .iter()
            .filter(|x| x.round == 1)
            .map(|x| (x.home.as_str(), x.away.as_str()))
            .collect();
        assert_eq!(round_one, vec![("A", "D"), ("B", "C")]);
    }

    // ------------------------------------------------------------------
    // Odd club counts
    // ------------------------------------------------------------------

    #[test]
    fn odd_count_uses_a_bye() {
        for n in [3, 5, 7] {
            let ids = clubs(n);
            let p = pairings(&ids).unwrap();
            assert_eq!(p.len(), n * (n - 1), "n = {n}");
            assert_eq!(round_count(n), 2 * n as u32);

            for id in &ids {
                let rounds_played: HashSet<u32> = p
                    .iter()
                    .filter(|x| &x.home == id || &x.away == id)
                    .map(|x| x.round)
                    .collect();
                assert_eq!(rounds_played.len(), 2 * (n - 1));
                // One rest per leg.
                assert_eq!(round_count(n) as usize - rounds_played.len(), 2);
            }
        }
    }

    // ------------------------------------------------------------------
    // Fixture records
    // ------------------------------------------------------------------

    #[test]
    fn generated_fixtures_are_scheduled_with_unique_ids_and_round_dates() {
        let fixtures = generate(&league(), &clubs(4), &calendar()).unwrap();
        let ids: HashSet<&str> = fixtures.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids.len(), fixtures.len());

        for f in &fixtures {
            assert_eq!(f.status, crate::model::FixtureStatus::Scheduled);
            assert!(f.result.is_none());
            assert_eq!(f.league_id, "league_1");
            assert_eq!(f.scheduled_date, calendar().date_for_round(f.round));
        }
    }

    #[test]
    fn calendar_spaces_rounds() {
        let cal = calendar();
        assert_eq!(cal.date_for_round(1), NaiveDate::from_ymd_opt(2026, 8, 1).unwrap());
        assert_eq!(cal.date_for_round(3), NaiveDate::from_ymd_opt(2026, 8, 15).unwrap());
    }
}
