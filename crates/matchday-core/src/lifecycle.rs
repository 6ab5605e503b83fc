// Fixture status state machine.
//
//   Scheduled -> InProgress -> Completed
//        \            \
//         +------------+--> Cancelled
//
// These functions only touch the fixture record. Persisting it, and the
// standings/stats side effects of completion, belong to the engine.

use chrono::{Duration, NaiveDateTime};
use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{Fixture, FixtureId, FixtureStatus};

/// Default length, in minutes, of the live window used by [`auto_advance`].
pub const DEFAULT_LIVE_WINDOW_MINUTES: u32 = 120;

pub fn default_live_window() -> Duration {
    Duration::minutes(i64::from(DEFAULT_LIVE_WINDOW_MINUTES))
}

fn invalid(fixture: &Fixture, action: &'static str) -> Error {
    Error::InvalidState {
        fixture_id: fixture.id.clone(),
        action,
        status: fixture.status,
    }
}

/// `Scheduled -> InProgress`.
pub fn start(fixture: &mut Fixture) -> Result<()> {
    if fixture.status != FixtureStatus::Scheduled {
        return Err(invalid(fixture, "start"));
    }
    fixture.status = FixtureStatus::InProgress;
    debug!("Fixture {} started", fixture.id);
    Ok(())
}

/// `InProgress -> Completed`. Requires a recorded result.
pub fn complete(fixture: &mut Fixture) -> Result<()> {
    if fixture.status != FixtureStatus::InProgress {
        return Err(invalid(fixture, "complete"));
    }
    if fixture.result.is_none() {
        return Err(Error::validation(format!(
            "fixture {} has no result to complete with",
            fixture.id
        )));
    }
    fixture.status = FixtureStatus::Completed;
    debug!("Fixture {} completed", fixture.id);
    Ok(())
}

/// Any non-terminal state `-> Cancelled`.
pub fn cancel(fixture: &mut Fixture) -> Result<()> {
    if fixture.status.is_terminal() {
        return Err(invalid(fixture, "cancel"));
    }
    fixture.status = FixtureStatus::Cancelled;
    debug!("Fixture {} cancelled", fixture.id);
    Ok(())
}

/// Whether a scheduled fixture should be live at `now`.
///
/// With a kick-off time the fixture is due while `now` lies inside
/// `[kick-off, kick-off + window]`. Without one it is due from the start of
/// its scheduled date onwards.
pub fn is_due(fixture: &Fixture, now: NaiveDateTime, window: Duration) -> bool {
    if fixture.status != FixtureStatus::Scheduled {
        return false;
    }
    match fixture.scheduled_time {
        Some(time) => {
            let kick_off = fixture.scheduled_date.and_time(time);
            now >= kick_off && now <= kick_off + window
        }
        None => fixture.scheduled_date <= now.date(),
    }
}

/// Promote every due fixture to `InProgress`, returning the promoted IDs.
///
/// Best effort: nothing happens unless a caller runs the sweep.
pub fn auto_advance(fixtures: &mut [Fixture], now: NaiveDateTime, window: Duration) -> Vec<FixtureId> {
    let mut promoted = Vec::new();
    for fixture in fixtures.iter_mut() {
        if is_due(fixture, now, window) {
            fixture.status = FixtureStatus::InProgress;
            promoted.push(fixture.id.clone());
        }
    }
    promoted
}
