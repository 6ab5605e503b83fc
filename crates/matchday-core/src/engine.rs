// League engine: every league and fixture operation, composed from the pure
// modules and persisted through a `Store`.
//
// The engine assumes a single writer per league (see the app crate's hub).
// Versioned saves still reject anything that raced past that assumption.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::export;
use crate::fixtures::{self, RoundCalendar};
use crate::lifecycle;
use crate::model::{
    Club, ClubId, Division, Fixture, FixtureId, FixtureStatus, League, LeagueId, LeagueStatus,
    PlayerMatchStat, PointsSystem, StandingsEntry,
};
use crate::repository::{FixtureFilter, Store, WriteBatch};
use crate::scores;
use crate::standings;
use crate::stats::{self, AggregationReport};

/// Outcome of completing a fixture.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub fixture: Fixture,
    pub standings: Vec<StandingsEntry>,
    /// `None` when the fixture carried no player stats. Per-player failures
    /// are listed in the report.
    pub stats: Option<AggregationReport>,
}

/// Outcome of removing a club from a league.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Disqualification {
    pub club_id: ClubId,
    pub cancelled: Vec<FixtureId>,
    pub standings: Vec<StandingsEntry>,
}

pub struct LeagueEngine<S> {
    store: S,
    config: Config,
}

impl<S: Store> LeagueEngine<S> {
    pub fn new(store: S, config: Config) -> Self {
        LeagueEngine { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Leagues and registration
    // -----------------------------------------------------------------------

    /// Create a league in `registration`. A missing ID gets a fresh UUID and
    /// a missing points system falls back to the configured one.
    pub fn create_league(
        &self,
        league_id: Option<LeagueId>,
        name: &str,
        points_system: Option<PointsSystem>,
    ) -> Result<League> {
        if name.trim().is_empty() {
            return Err(Error::validation("league name must not be empty"));
        }
        let points = points_system.unwrap_or(self.config.points);
        if points.win <= points.draw || points.draw < points.loss {
            return Err(Error::validation(format!(
                "points system must satisfy win > draw >= loss, got {}/{}/{}",
                points.win, points.draw, points.loss
            )));
        }

        let id = league_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        let league = self.store.insert_league(&League::new(id, name.trim(), points))?;
        info!("Created league {} ({})", league.id, league.name);
        Ok(league)
    }

    pub fn league(&self, league_id: &str) -> Result<League> {
        self.store.get_league(league_id)
    }

    /// Append a division. Only allowed while the league takes registrations.
    pub fn add_division(&self, league_id: &str, name: &str) -> Result<Division> {
        let mut league = self.store.get_league(league_id)?;
        require_league_status(&league, LeagueStatus::Registration, "add a division")?;
        if name.trim().is_empty() {
            return Err(Error::validation("division name must not be empty"));
        }

        let division = Division {
            id: Uuid::new_v4().to_string(),
            league_id: league.id.clone(),
            name: name.trim().to_string(),
            order: league.divisions.iter().map(|d| d.order).max().unwrap_or(0) + 1,
            club_ids: Vec::new(),
        };
        league.divisions.push(division.clone());
        self.store.save_league(&league)?;

        info!("Added division {} to league {}", division.name, league_id);
        Ok(division)
    }

    /// Store `club` and enter it into one of the league's divisions.
    pub fn register_club(&self, league_id: &str, division_id: &str, club: Club) -> Result<League> {
        let mut league = self.store.get_league(league_id)?;
        require_league_status(&league, LeagueStatus::Registration, "register a club")?;
        if club.id.is_empty() || club.name.trim().is_empty() {
            return Err(Error::validation("club needs a non-empty id and name"));
        }
        if league.has_club(&club.id) {
            return Err(Error::validation(format!(
                "club {} is already registered in league {}",
                club.id, league_id
            )));
        }

        let division = league
            .divisions
            .iter_mut()
            .find(|d| d.id == division_id)
            .ok_or_else(|| Error::not_found("division", division_id))?;
        division.club_ids.push(club.id.clone());

        self.store.insert_club(&club)?;
        let league = self.store.save_league(&league)?;
        info!("Registered club {} in league {}", club.id, league_id);
        Ok(league)
    }

    /// `registration_closed -> active`.
    pub fn activate_league(&self, league_id: &str) -> Result<League> {
        let mut league = self.store.get_league(league_id)?;
        require_league_status(&league, LeagueStatus::RegistrationClosed, "activate")?;
        league.status = LeagueStatus::Active;
        let league = self.store.save_league(&league)?;
        info!("League {} is active", league_id);
        Ok(league)
    }

    /// `active -> completed`, once no fixture is left to play.
    pub fn close_season(&self, league_id: &str) -> Result<League> {
        let mut league = self.store.get_league(league_id)?;
        require_league_status(&league, LeagueStatus::Active, "close the season")?;

        let open = self
            .store
            .list_fixtures(&FixtureFilter::league(league_id))?
            .into_iter()
            .filter(|f| !f.status.is_terminal())
            .count();
        if open > 0 {
            return Err(Error::validation(format!(
                "league {league_id} still has {open} fixtures to play or cancel"
            )));
        }

        league.standings = self.compute_table(&league, &[])?;
        league.status = LeagueStatus::Completed;
        let league = self.store.save_league(&league)?;
        info!("Closed season for league {}", league_id);
        Ok(league)
    }

    // -----------------------------------------------------------------------
    // Fixture generation
    // -----------------------------------------------------------------------

    /// Build the double round-robin and close registration in one commit.
    pub fn generate_fixtures(&self, league_id: &str, start_date: NaiveDate) -> Result<Vec<Fixture>> {
        let mut league = self.store.get_league(league_id)?;
        require_league_status(&league, LeagueStatus::Registration, "generate fixtures")?;

        let calendar = RoundCalendar::new(start_date, self.config.schedule.days_between_rounds);
        let generated = fixtures::generate(&league.id, &league.club_ids(), &calendar)?;

        // The versioned league save is what stops two generators racing.
        league.status = LeagueStatus::RegistrationClosed;
        league.standings = standings::recompute(&league, &[], |id| self.club_name(id));
        self.store.commit(WriteBatch {
            league: Some(&league),
            new_fixtures: &generated,
            ..Default::default()
        })?;

        info!(
            "Generated {} fixtures for league {}, registration closed",
            generated.len(),
            league_id
        );
        self.store.list_fixtures(&FixtureFilter::league(league_id))
    }

    pub fn list_fixtures(&self, filter: &FixtureFilter) -> Result<Vec<Fixture>> {
        self.store.list_fixtures(filter)
    }

    pub fn fixture(&self, fixture_id: &str) -> Result<Fixture> {
        self.store.get_fixture(fixture_id)
    }

    // -----------------------------------------------------------------------
    // Fixture lifecycle
    // -----------------------------------------------------------------------

    pub fn start_fixture(&self, fixture_id: &str, expected_version: Option<u64>) -> Result<Fixture> {
        let mut fixture = self.load_fixture(fixture_id, expected_version)?;
        self.ensure_season_open(&fixture.league_id)?;
        lifecycle::start(&mut fixture)?;
        let fixture = self.store.save_fixture(&fixture)?;
        info!("Fixture {} kicked off", fixture_id);
        Ok(fixture)
    }

    /// Promote every due fixture of the league. A fixture whose save fails is
    /// logged and left out of the returned IDs.
    pub fn auto_advance(&self, league_id: &str, now: NaiveDateTime) -> Result<Vec<FixtureId>> {
        self.ensure_season_open(league_id)?;
        let mut scheduled = self
            .store
            .list_fixtures(&FixtureFilter::league(league_id).with_status(FixtureStatus::Scheduled))?;

        let due = lifecycle::auto_advance(&mut scheduled, now, self.config.schedule.live_window());
        let mut promoted = Vec::with_capacity(due.len());
        for fixture in scheduled.iter().filter(|f| due.contains(&f.id)) {
            match self.store.save_fixture(fixture) {
                Ok(_) => promoted.push(fixture.id.clone()),
                Err(e) => warn!("Auto-advance skipped fixture {}: {}", fixture.id, e),
            }
        }

        if !promoted.is_empty() {
            info!("Auto-advanced {} fixtures in league {}", promoted.len(), league_id);
        }
        Ok(promoted)
    }

    pub fn update_scores(
        &self,
        fixture_id: &str,
        score_a: i64,
        score_b: i64,
        at: DateTime<Utc>,
        expected_version: Option<u64>,
    ) -> Result<Fixture> {
        let mut fixture = self.load_fixture(fixture_id, expected_version)?;
        self.ensure_season_open(&fixture.league_id)?;
        scores::update_scores(&mut fixture, score_a, score_b, at)?;
        let fixture = self.store.save_fixture(&fixture)?;
        debug!("Fixture {} score now {}-{}", fixture_id, score_a, score_b);
        Ok(fixture)
    }

    pub fn record_player_stats(
        &self,
        fixture_id: &str,
        stats: Vec<PlayerMatchStat>,
        expected_version: Option<u64>,
    ) -> Result<Fixture> {
        let mut fixture = self.load_fixture(fixture_id, expected_version)?;
        self.ensure_season_open(&fixture.league_id)?;
        let count = stats.len();
        scores::record_player_stats(&mut fixture, stats)?;
        let fixture = self.store.save_fixture(&fixture)?;
        debug!("Recorded {} player stats for fixture {}", count, fixture_id);
        Ok(fixture)
    }

    /// Finish a fixture, rebuild the table and fold in player stats.
    ///
    /// The completed fixture, its stats marker and the new table are
    /// committed together; if that fails nothing changed and the call can be
    /// retried. Profile updates follow the commit and a failing player is
    /// reported without undoing the completion.
    pub fn complete_fixture(&self, fixture_id: &str, expected_version: Option<u64>) -> Result<Completion> {
        let mut fixture = self.load_fixture(fixture_id, expected_version)?;
        let mut league = self.store.get_league(&fixture.league_id)?;
        require_season_open(&league)?;

        lifecycle::complete(&mut fixture)?;
        let has_stats = fixture.player_stats.as_ref().is_some_and(|s| !s.is_empty());
        if has_stats {
            stats::mark_applied(&mut fixture)?;
        }
        league.standings = self.compute_table(&league, std::slice::from_ref(&fixture))?;

        let mut committed = self.store.commit(WriteBatch {
            league: Some(&league),
            fixtures: std::slice::from_ref(&fixture),
            ..Default::default()
        })?;
        let fixture = committed
            .fixtures
            .pop()
            .ok_or_else(|| Error::not_found("fixture", fixture_id))?;
        let standings = committed.league.map(|l| l.standings).unwrap_or(league.standings);
        info!("Fixture {} completed", fixture_id);

        let stats = has_stats.then(|| stats::apply_to_profiles(&fixture, &self.store));

        Ok(Completion {
            fixture,
            standings,
            stats,
        })
    }

    /// Cancel a fixture that has not been completed.
    pub fn cancel_fixture(&self, fixture_id: &str, expected_version: Option<u64>) -> Result<Fixture> {
        let mut fixture = self.load_fixture(fixture_id, expected_version)?;
        self.ensure_season_open(&fixture.league_id)?;
        lifecycle::cancel(&mut fixture)?;
        let fixture = self.store.save_fixture(&fixture)?;
        info!("Fixture {} cancelled", fixture_id);
        Ok(fixture)
    }

    /// Remove a club from the league: cancel its open fixtures, drop it from
    /// every division and rebuild the table. Results it already completed
    /// still count for its opponents.
    pub fn disqualify_club(&self, league_id: &str, club_id: &str) -> Result<Disqualification> {
        let mut league = self.store.get_league(league_id)?;
        require_season_open(&league)?;
        if !league.has_club(club_id) {
            return Err(Error::not_found("club", club_id));
        }

        let mut open: Vec<Fixture> = self
            .store
            .list_fixtures(&FixtureFilter::league(league_id).with_club(club_id))?
            .into_iter()
            .filter(|f| !f.status.is_terminal())
            .collect();
        for fixture in &mut open {
            lifecycle::cancel(fixture)?;
        }

        for division in &mut league.divisions {
            division.club_ids.retain(|c| c != club_id);
        }
        league.standings = self.compute_table(&league, &[])?;
        let committed = self.store.commit(WriteBatch {
            league: Some(&league),
            fixtures: &open,
            ..Default::default()
        })?;
        let cancelled: Vec<FixtureId> = committed.fixtures.into_iter().map(|f| f.id).collect();
        let standings = committed.league.map(|l| l.standings).unwrap_or(league.standings);

        info!(
            "Disqualified club {} from league {}, {} fixtures cancelled",
            club_id,
            league_id,
            cancelled.len()
        );
        Ok(Disqualification {
            club_id: club_id.to_string(),
            cancelled,
            standings,
        })
    }

    // -----------------------------------------------------------------------
    // Standings and stats
    // -----------------------------------------------------------------------

    /// Rebuild and persist the league table from its completed fixtures.
    pub fn recompute_standings(&self, league_id: &str) -> Result<Vec<StandingsEntry>> {
        let mut league = self.store.get_league(league_id)?;
        league.standings = self.compute_table(&league, &[])?;
        let league = self.store.save_league(&league)?;
        Ok(league.standings)
    }

    /// The cached table as last persisted.
    pub fn standings(&self, league_id: &str) -> Result<Vec<StandingsEntry>> {
        Ok(self.store.get_league(league_id)?.standings)
    }

    pub fn export_standings_csv(&self, league_id: &str) -> Result<String> {
        export::standings_csv(&self.standings(league_id)?)
    }

    /// Apply a completed fixture's player stats. Idempotent: the marker is
    /// saved before any profile is touched.
    pub fn apply_player_stats(&self, fixture_id: &str) -> Result<AggregationReport> {
        let mut fixture = self.store.get_fixture(fixture_id)?;
        if !stats::mark_applied(&mut fixture)? {
            return Ok(AggregationReport::already_applied(fixture.id));
        }
        let fixture = self.store.save_fixture(&fixture)?;
        Ok(stats::apply_to_profiles(&fixture, &self.store))
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Table from the stored completed fixtures, with `pending` (not yet
    /// committed) taking the place of their stored copies.
    fn compute_table(&self, league: &League, pending: &[Fixture]) -> Result<Vec<StandingsEntry>> {
        let mut fixtures: Vec<Fixture> = self
            .store
            .list_fixtures(
                &FixtureFilter::league(league.id.clone()).with_status(FixtureStatus::Completed),
            )?
            .into_iter()
            .filter(|f| pending.iter().all(|p| p.id != f.id))
            .collect();
        fixtures.extend_from_slice(pending);
        let table = standings::recompute(league, &fixtures, |id| self.club_name(id));
        debug!(
            "Recomputed standings for league {} from {} completed fixtures",
            league.id,
            fixtures.len()
        );
        Ok(table)
    }

    fn club_name(&self, club_id: &str) -> Option<String> {
        self.store.get_club(club_id).ok().map(|c| c.name)
    }

    fn load_fixture(&self, fixture_id: &str, expected_version: Option<u64>) -> Result<Fixture> {
        let fixture = self.store.get_fixture(fixture_id)?;
        match expected_version {
            Some(expected) if expected != fixture.version => Err(Error::Conflict {
                entity: "fixture",
                id: fixture.id,
                expected,
            }),
            _ => Ok(fixture),
        }
    }

    fn ensure_season_open(&self, league_id: &str) -> Result<()> {
        require_season_open(&self.store.get_league(league_id)?)
    }
}

fn require_league_status(league: &League, wanted: LeagueStatus, action: &'static str) -> Result<()> {
    if league.status != wanted {
        return Err(Error::InvalidLeagueState {
            league_id: league.id.clone(),
            action,
            status: league.status,
        });
    }
    Ok(())
}

/// Fixtures of a closed season are frozen.
fn require_season_open(league: &League) -> Result<()> {
    if league.status == LeagueStatus::Completed {
        return Err(Error::InvalidLeagueState {
            league_id: league.id.clone(),
            action: "change fixtures",
            status: league.status,
        });
    }
    Ok(())
}
