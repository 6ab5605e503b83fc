// League table computation.
//
// The table is always rebuilt from scratch out of the completed fixtures; it
// is never patched incrementally.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::model::{Fixture, FixtureStatus, League, PointsSystem, StandingsEntry};

/// Table ordering: points, then goal difference, then goals scored, all
/// descending. Anything beyond that compares equal, so a stable sort keeps
/// the clubs' registration order.
pub fn compare_entries(a: &StandingsEntry, b: &StandingsEntry) -> Ordering {
    b.points
        .cmp(&a.points)
        .then(b.goal_difference.cmp(&a.goal_difference))
        .then(b.goals_for.cmp(&a.goals_for))
}

fn record(entry: &mut StandingsEntry, scored: u32, conceded: u32, points: &PointsSystem) {
    entry.matches_played += 1;
    entry.goals_for += scored;
    entry.goals_against += conceded;
    match scored.cmp(&conceded) {
        Ordering::Greater => {
            entry.matches_won += 1;
            entry.points += points.win;
        }
        Ordering::Equal => {
            entry.matches_drawn += 1;
            entry.points += points.draw;
        }
        Ordering::Less => {
            entry.matches_lost += 1;
            entry.points += points.loss;
        }
    }
}

/// Recompute the table for `league` from `fixtures`.
///
/// The entry set is exactly the league's distinct division clubs. Only
/// completed fixtures with a result count; a side that is no longer in any
/// division is skipped while its opponent keeps the result. `club_name`
/// resolves display names and falls back to the club ID.
pub fn recompute<F>(league: &League, fixtures: &[Fixture], club_name: F) -> Vec<StandingsEntry>
where
    F: Fn(&str) -> Option<String>,
{
    let club_ids = league.club_ids();
    let mut entries: Vec<StandingsEntry> = club_ids
        .iter()
        .map(|id| StandingsEntry::new(id.clone(), club_name(id).unwrap_or_else(|| id.clone())))
        .collect();
    let index: HashMap<String, usize> = club_ids
        .into_iter()
        .enumerate()
        .map(|(i, id)| (id, i))
        .collect();

    for fixture in fixtures {
        if fixture.status != FixtureStatus::Completed || fixture.league_id != league.id {
            continue;
        }
        let Some(result) = &fixture.result else {
            continue;
        };

        if let Some(&i) = index.get(&fixture.team_a_id) {
            record(&mut entries[i], result.score_a, result.score_b, &league.points_system);
        }
        if let Some(&i) = index.get(&fixture.team_b_id) {
            record(&mut entries[i], result.score_b, result.score_a, &league.points_system);
        }
    }

    for entry in &mut entries {
        entry.goal_difference = i64::from(entry.goals_for) - i64::from(entry.goals_against);
    }

    entries.sort_by(compare_entries);
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.position = i as u32 + 1;
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Division, FixtureResult};
    use chrono::NaiveDate;

    fn league(clubs: &[&str]) -> League {
        let mut league = League::new("l1", "Test League", PointsSystem::default());
        league.divisions.push(Division {
            id: "d1".into(),
            league_id: "l1".into(),
            name: "Premier".into(),
            order: 1,
            club_ids: clubs.iter().map(|c| c.to_string()).collect(),
        });
        league
    }

    fn played(id: &str, a: &str, b: &str, score_a: u32, score_b: u32) -> Fixture {
        let date = NaiveDate::from_ymd_opt(2026, 2, 7).unwrap();
        let winner_id = match score_a.cmp(&score_b) {
            Ordering::Greater => Some(a.to_string()),
            Ordering::Less => Some(b.to_string()),
            Ordering::Equal => None,
        };
        Fixture {
            status: FixtureStatus::Completed,
            result: Some(FixtureResult {
                score_a,
                score_b,
                winner_id,
            }),
            ..Fixture::scheduled(id, "l1", 1, a, b, date)
        }
    }

    fn no_names(_: &str) -> Option<String> {
        None
    }

    fn entry<'a>(table: &'a [StandingsEntry], club: &str) -> &'a StandingsEntry {
        table.iter().find(|e| e.club_id == club).unwrap()
    }

    #[test]
    fn win_updates_both_sides() {
        let table = recompute(&league(&["A", "B"]), &[played("f1", "A", "B", 2, 1)], no_names);

        let a = entry(&table, "A");
        assert_eq!((a.matches_played, a.matches_won, a.points), (1, 1, 3));
        assert_eq!((a.goals_for, a.goals_against, a.goal_difference), (2, 1, 1));
        assert_eq!(a.position, 1);

        let b = entry(&table, "B");
        assert_eq!((b.matches_played, b.matches_lost, b.points), (1, 1, 0));
        assert_eq!((b.goals_for, b.goals_against, b.goal_difference), (1, 2, -1));
        assert_eq!(b.position, 2);
    }

    #[test]
    fn draw_awards_draw_points() {
        let table = recompute(&league(&["A", "B"]), &[played("f1", "A", "B", 1, 1)], no_names);
        for club in ["A", "B"] {
            let e = entry(&table, club);
            assert_eq!((e.matches_drawn, e.points), (1, 1));
        }
    }

    #[test]
    fn custom_points_system_is_applied() {
        let mut l = league(&["A", "B", "C"]);
        l.points_system = PointsSystem {
            win: 2,
            draw: 1,
            loss: 0,
        };
        let table = recompute(
            &l,
            &[played("f1", "A", "B", 1, 0), played("f2", "B", "C", 0, 0)],
            no_names,
        );
        assert_eq!(entry(&table, "A").points, 2);
        assert_eq!(entry(&table, "B").points, 1);
        assert_eq!(entry(&table, "C").points, 1);
    }

    #[test]
    fn goals_for_breaks_points_and_difference_tie() {
        // A and B both win once by one goal; B scored more.
        let table = recompute(
            &league(&["A", "B", "C", "D"]),
            &[played("f1", "A", "C", 1, 0), played("f2", "B", "D", 3, 2)],
            no_names,
        );
        assert_eq!(table[0].club_id, "B");
        assert_eq!(table[1].club_id, "A");
    }

    #[test]
    fn full_tie_keeps_registration_order() {
        let table = recompute(&league(&["C", "A", "B"]), &[], no_names);
        let order: Vec<&str> = table.iter().map(|e| e.club_id.as_str()).collect();
        assert_eq!(order, vec!["C", "A", "B"]);
        let positions: Vec<u32> = table.iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
    }

    #[test]
    fn only_completed_fixtures_count() {
        let mut live = played("f1", "A", "B", 4, 0);
        live.status = FixtureStatus::InProgress;
        let mut cancelled = played("f2", "A", "B", 4, 0);
        cancelled.status = FixtureStatus::Cancelled;

        let table = recompute(&league(&["A", "B"]), &[live, cancelled], no_names);
        assert!(table.iter().all(|e| e.matches_played == 0 && e.points == 0));
    }

    #[test]
    fn club_outside_divisions_is_not_tabled() {
        let table = recompute(&league(&["A", "B"]), &[played("f1", "A", "X", 2, 0)], no_names);
        assert_eq!(table.len(), 2);
        assert!(table.iter().all(|e| e.club_id != "X"));
        assert_eq!(entry(&table, "A").points, 3);
    }

    #[test]
    fn recompute_is_deterministic() {
        let l = league(&["A", "B", "C", "D"]);
        let fixtures = vec![
            played("f1", "A", "B", 2, 2),
            played("f2", "C", "D", 0, 1),
            played("f3", "A", "C", 3, 1),
        ];
        let first = recompute(&l, &fixtures, no_names);
        let second = recompute(&l, &fixtures, no_names);
        assert_eq!(first, second);
    }

    #[test]
    fn names_resolve_with_id_fallback() {
        let table = recompute(&league(&["A", "B"]), &[], |id| {
            (id == "A").then(|| "Athletic".to_string())
        });
        assert_eq!(entry(&table, "A").club_name, "Athletic");
        assert_eq!(entry(&table, "B").club_name, "B");
    }
}
