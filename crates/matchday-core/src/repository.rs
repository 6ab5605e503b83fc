// Persistence boundary: repository traits and typed query filters.
//
// Saves are versioned. A save carries the version the caller read; the
// repository rejects it with `Error::Conflict` if the stored record moved on,
// and returns the record with its bumped version on success.

use crate::error::Result;
use crate::model::{
    Club, ClubId, Fixture, FixtureStatus, League, LeagueId, PlayerStats, Profile, ProfileUpdate,
};

/// Typed fixture query. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixtureFilter {
    pub league_id: Option<LeagueId>,
    pub status: Option<FixtureStatus>,
    /// Matches fixtures where the club plays on either side.
    pub club_id: Option<ClubId>,
    pub round: Option<u32>,
}

impl FixtureFilter {
    pub fn league(league_id: impl Into<LeagueId>) -> Self {
        FixtureFilter {
            league_id: Some(league_id.into()),
            ..Default::default()
        }
    }

    pub fn with_status(mut self, status: FixtureStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_club(mut self, club_id: impl Into<ClubId>) -> Self {
        self.club_id = Some(club_id.into());
        self
    }

    pub fn with_round(mut self, round: u32) -> Self {
        self.round = Some(round);
        self
    }

    /// In-memory evaluation, used by callers that already hold fixtures.
    pub fn matches(&self, fixture: &Fixture) -> bool {
        self.league_id.as_ref().is_none_or(|l| &fixture.league_id == l)
            && self.status.is_none_or(|s| fixture.status == s)
            && self.club_id.as_ref().is_none_or(|c| fixture.involves(c))
            && self.round.is_none_or(|r| fixture.round == r)
    }
}

pub trait LeagueRepository {
    fn get_league(&self, league_id: &str) -> Result<League>;

    /// Store a brand-new league. Fails `Conflict` if the ID is taken.
    fn insert_league(&self, league: &League) -> Result<League>;

    /// Full-document overwrite guarded by `league.version`.
    fn save_league(&self, league: &League) -> Result<League>;
}

pub trait FixtureRepository {
    fn get_fixture(&self, fixture_id: &str) -> Result<Fixture>;

    /// Fixtures matching `filter`, ordered by round then insertion order.
    fn list_fixtures(&self, filter: &FixtureFilter) -> Result<Vec<Fixture>>;

    /// Bulk insert of a freshly generated fixture set, all or nothing.
    fn insert_fixtures(&self, fixtures: &[Fixture]) -> Result<()>;

    /// Overwrite a single fixture guarded by `fixture.version`.
    fn save_fixture(&self, fixture: &Fixture) -> Result<Fixture>;
}

pub trait ClubRepository {
    fn get_club(&self, club_id: &str) -> Result<Club>;

    fn insert_club(&self, club: &Club) -> Result<()>;
}

pub trait PlayerProfileRepository {
    fn get_profile(&self, player_id: &str) -> Result<Profile>;

    /// Apply a partial update, creating a zero-initialized profile first if
    /// none exists. Returns the stored profile.
    fn save_profile(&self, player_id: &str, update: ProfileUpdate) -> Result<Profile>;

    /// Add `delta` to the player's cumulative stats as one read-modify-write,
    /// creating the profile if needed. Concurrent calls must not lose
    /// increments.
    fn add_stats(&self, player_id: &str, delta: &PlayerStats) -> Result<Profile>;
}

/// Writes that land together or not at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteBatch<'a> {
    /// Versioned league save.
    pub league: Option<&'a League>,
    /// Versioned fixture saves.
    pub fixtures: &'a [Fixture],
    /// Fresh fixtures to insert.
    pub new_fixtures: &'a [Fixture],
}

/// Records as stored by a committed batch, versions bumped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Committed {
    pub league: Option<League>,
    pub fixtures: Vec<Fixture>,
}

pub trait BatchRepository {
    /// Apply every write in `batch` in one transaction. Any failure, a
    /// version conflict included, leaves the store untouched.
    fn commit(&self, batch: WriteBatch<'_>) -> Result<Committed>;
}

/// Everything the engine needs from the persistence layer.
pub trait Store:
    LeagueRepository + FixtureRepository + ClubRepository + PlayerProfileRepository + BatchRepository
{
}

impl<T> Store for T where
    T: LeagueRepository
        + FixtureRepository
        + ClubRepository
        + PlayerProfileRepository
        + BatchRepository
{
}
