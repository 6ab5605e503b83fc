// Folding a completed fixture's player stats into cumulative profile stats.

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::{Fixture, FixtureId, FixtureStatus, PlayerId, PlayerMatchStat, PlayerStats};
use crate::repository::PlayerProfileRepository;

/// How a fixture ended from one club's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Won,
    Drawn,
    Lost,
}

impl Outcome {
    /// Outcome for `club_id`, or `None` if the fixture has no result.
    pub fn for_club(fixture: &Fixture, club_id: &str) -> Option<Self> {
        let result = fixture.result.as_ref()?;
        Some(match result.winner_id.as_deref() {
            None => Outcome::Drawn,
            Some(winner) if winner == club_id => Outcome::Won,
            Some(_) => Outcome::Lost,
        })
    }
}

/// Add one fixture's contribution to a player's running totals.
pub fn accumulate(stats: &mut PlayerStats, record: &PlayerMatchStat, outcome: Outcome) {
    stats.goals += record.goals;
    stats.assists += record.assists;
    stats.matches_played += 1;
    match outcome {
        Outcome::Won => stats.matches_won += 1,
        Outcome::Drawn => stats.matches_drawn += 1,
        Outcome::Lost => stats.matches_lost += 1,
    }
    stats.yellow_cards += u32::from(record.yellow_cards);
    if record.red_card {
        stats.red_cards += 1;
    }
}

/// What happened during one aggregation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationReport {
    pub fixture_id: FixtureId,
    /// The fixture had already been applied; nothing was touched.
    pub already_applied: bool,
    pub applied: Vec<PlayerId>,
    /// Players whose profile update failed, with the reason.
    pub failed: Vec<(PlayerId, String)>,
}

impl AggregationReport {
    pub fn already_applied(fixture_id: impl Into<FixtureId>) -> Self {
        AggregationReport {
            fixture_id: fixture_id.into(),
            already_applied: true,
            ..Default::default()
        }
    }
}

/// Set the fixture's `stats_applied` marker.
///
/// Returns `false` when it was already set. The caller persists the marked
/// fixture before calling [`apply_to_profiles`], so a crash between the two
/// can drop increments but never double them.
pub fn mark_applied(fixture: &mut Fixture) -> Result<bool> {
    if fixture.stats_applied {
        debug!("Player stats for fixture {} already applied, skipping", fixture.id);
        return Ok(false);
    }
    if fixture.status != FixtureStatus::Completed {
        return Err(Error::InvalidState {
            fixture_id: fixture.id.clone(),
            action: "apply player stats",
            status: fixture.status,
        });
    }
    fixture.stats_applied = true;
    Ok(true)
}

fn apply_one<R>(profiles: &R, fixture: &Fixture, record: &PlayerMatchStat) -> Result<()>
where
    R: PlayerProfileRepository + ?Sized,
{
    let outcome = Outcome::for_club(fixture, &record.club_id)
        .ok_or_else(|| Error::validation(format!("fixture {} has no result", fixture.id)))?;

    let mut delta = PlayerStats::default();
    accumulate(&mut delta, record, outcome);
    profiles.add_stats(&record.user_id, &delta)?;
    Ok(())
}

/// Add a completed fixture's player stats to the players' profiles.
///
/// A failure for one player is logged and the rest of the batch still goes
/// through.
pub fn apply_to_profiles<R>(fixture: &Fixture, profiles: &R) -> AggregationReport
where
    R: PlayerProfileRepository + ?Sized,
{
    let mut report = AggregationReport {
        fixture_id: fixture.id.clone(),
        ..Default::default()
    };

    for record in fixture.player_stats.iter().flatten() {
        match apply_one(profiles, fixture, record) {
            Ok(()) => report.applied.push(record.user_id.clone()),
            Err(e) => {
                warn!(
                    "Failed to apply stats for player {} from fixture {}: {}",
                    record.user_id, fixture.id, e
                );
                report.failed.push((record.user_id.clone(), e.to_string()));
            }
        }
    }

    debug!(
        "Applied player stats for fixture {}: {} ok, {} failed",
        fixture.id,
        report.applied.len(),
        report.failed.len()
    );
    report
}
