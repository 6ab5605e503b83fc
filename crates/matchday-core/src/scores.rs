// Live score tracking and player match-stat entry for in-progress fixtures.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::model::{ClubId, Fixture, FixtureResult, FixtureStatus, PlayerMatchStat, ScoreUpdate};

/// Most yellow cards a player can collect before the second becomes a red.
pub const MAX_YELLOW_CARDS: u8 = 2;

fn require_live(fixture: &Fixture, action: &'static str) -> Result<()> {
    if fixture.status != FixtureStatus::InProgress {
        return Err(Error::InvalidState {
            fixture_id: fixture.id.clone(),
            action,
            status: fixture.status,
        });
    }
    Ok(())
}

fn checked_score(value: i64, side: &str) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| Error::validation(format!("score for team {side} must be a non-negative integer, got {value}")))
}

/// The winning club for a scoreline, `None` for a draw.
pub fn winner_for(fixture: &Fixture, score_a: u32, score_b: u32) -> Option<ClubId> {
    match score_a.cmp(&score_b) {
        std::cmp::Ordering::Greater => Some(fixture.team_a_id.clone()),
        std::cmp::Ordering::Less => Some(fixture.team_b_id.clone()),
        std::cmp::Ordering::Equal => None,
    }
}

/// Replace the fixture's provisional result.
///
/// Scores arrive signed so negative input is reported as a validation error
/// instead of failing to deserialize. The winner is recomputed on every call
/// and the update is appended to the fixture's score history.
pub fn update_scores(fixture: &mut Fixture, score_a: i64, score_b: i64, at: DateTime<Utc>) -> Result<()> {
    require_live(fixture, "update scores")?;
    let score_a = checked_score(score_a, "A")?;
    let score_b = checked_score(score_b, "B")?;

    fixture.result = Some(FixtureResult {
        score_a,
        score_b,
        winner_id: winner_for(fixture, score_a, score_b),
    });
    fixture.score_history.push(ScoreUpdate {
        score_a,
        score_b,
        recorded_at: at,
    });
    Ok(())
}

/// Check a batch of player stats against the fixture it belongs to.
pub fn validate_player_stats(fixture: &Fixture, stats: &[PlayerMatchStat]) -> Result<()> {
    let mut seen = HashSet::new();
    for stat in stats {
        if stat.user_id.is_empty() {
            return Err(Error::validation("player stat is missing a userId"));
        }
        if !fixture.involves(&stat.club_id) {
            return Err(Error::validation(format!(
                "player {} is recorded for club {}, which does not play in fixture {}",
                stat.user_id, stat.club_id, fixture.id
            )));
        }
        if stat.yellow_cards > MAX_YELLOW_CARDS {
            return Err(Error::validation(format!(
                "player {} has {} yellow cards (max {MAX_YELLOW_CARDS})",
                stat.user_id, stat.yellow_cards
            )));
        }
        if !seen.insert(stat.user_id.as_str()) {
            return Err(Error::validation(format!(
                "player {} appears more than once in fixture {}",
                stat.user_id, fixture.id
            )));
        }
    }
    Ok(())
}

/// Store the fixture's player stats, replacing any earlier submission.
pub fn record_player_stats(fixture: &mut Fixture, stats: Vec<PlayerMatchStat>) -> Result<()> {
    require_live(fixture, "record player stats")?;
    validate_player_stats(fixture, &stats)?;
    fixture.player_stats = Some(stats);
    Ok(())
}
