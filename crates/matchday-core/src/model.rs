// League, fixture, standings and player-stat records.
//
// Field names serialize in camelCase so stored documents keep the attribute
// names used by the rest of the platform (`teamAId`, `goalDifference`, ...).

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

pub type LeagueId = String;
pub type ClubId = String;
pub type FixtureId = String;
pub type PlayerId = String;

// ---------------------------------------------------------------------------
// League
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeagueStatus {
    Registration,
    RegistrationClosed,
    Active,
    Completed,
}

impl fmt::Display for LeagueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LeagueStatus::Registration => "registration",
            LeagueStatus::RegistrationClosed => "registration_closed",
            LeagueStatus::Active => "active",
            LeagueStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// Points awarded per match outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsSystem {
    pub win: u32,
    pub draw: u32,
    pub loss: u32,
}

impl Default for PointsSystem {
    fn default() -> Self {
        PointsSystem {
            win: 3,
            draw: 1,
            loss: 0,
        }
    }
}

/// A named grouping of clubs within a league.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Division {
    pub id: String,
    pub league_id: LeagueId,
    pub name: String,
    /// Display order among the league's divisions.
    pub order: u32,
    /// Member clubs, unique within the division.
    pub club_ids: Vec<ClubId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct League {
    pub id: LeagueId,
    pub name: String,
    pub status: LeagueStatus,
    #[serde(default)]
    pub divisions: Vec<Division>,
    /// Cached table, fully replaced on every recomputation.
    #[serde(default)]
    pub standings: Vec<StandingsEntry>,
    #[serde(default)]
    pub points_system: PointsSystem,
    /// Optimistic concurrency token, bumped by every successful save.
    #[serde(default)]
    pub version: u64,
}

impl League {
    pub fn new(id: impl Into<LeagueId>, name: impl Into<String>, points_system: PointsSystem) -> Self {
        League {
            id: id.into(),
            name: name.into(),
            status: LeagueStatus::Registration,
            divisions: Vec::new(),
            standings: Vec::new(),
            points_system,
            version: 0,
        }
    }

    /// Distinct club IDs across all divisions, in division order with the
    /// first occurrence winning.
    pub fn club_ids(&self) -> Vec<ClubId> {
        let mut divisions: Vec<&Division> = self.divisions.iter().collect();
        divisions.sort_by_key(|d| d.order);

        let mut seen = std::collections::HashSet::new();
        divisions
            .into_iter()
            .flat_map(|d| d.club_ids.iter())
            .filter(|id| seen.insert(id.as_str()))
            .cloned()
            .collect()
    }

    pub fn has_club(&self, club_id: &str) -> bool {
        self.divisions
            .iter()
            .any(|d| d.club_ids.iter().any(|c| c == club_id))
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl FixtureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FixtureStatus::Scheduled => "scheduled",
            FixtureStatus::InProgress => "in_progress",
            FixtureStatus::Completed => "completed",
            FixtureStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FixtureStatus::Completed | FixtureStatus::Cancelled)
    }
}

impl fmt::Display for FixtureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureResult {
    pub score_a: u32,
    pub score_b: u32,
    /// `None` for a draw.
    pub winner_id: Option<ClubId>,
}

/// One accepted score update while the fixture was live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreUpdate {
    pub score_a: u32,
    pub score_b: u32,
    pub recorded_at: DateTime<Utc>,
}

/// A player's contribution to a single fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerMatchStat {
    pub user_id: PlayerId,
    pub club_id: ClubId,
    #[serde(default)]
    pub goals: u32,
    #[serde(default)]
    pub assists: u32,
    #[serde(default)]
    pub yellow_cards: u8,
    #[serde(default)]
    pub red_card: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    pub id: FixtureId,
    pub league_id: LeagueId,
    /// 1-based round number.
    pub round: u32,
    /// Home side.
    pub team_a_id: ClubId,
    /// Away side.
    pub team_b_id: ClubId,
    pub scheduled_date: NaiveDate,
    #[serde(default)]
    pub scheduled_time: Option<NaiveTime>,
    pub status: FixtureStatus,
    #[serde(default)]
    pub result: Option<FixtureResult>,
    #[serde(default)]
    pub player_stats: Option<Vec<PlayerMatchStat>>,
    #[serde(default)]
    pub referee_id: Option<String>,
    #[serde(default)]
    pub pitch_id: Option<String>,
    /// Set once `player_stats` have been folded into player profiles.
    #[serde(default)]
    pub stats_applied: bool,
    /// Every accepted interim score, oldest first.
    #[serde(default)]
    pub score_history: Vec<ScoreUpdate>,
    #[serde(default)]
    pub version: u64,
}

impl Fixture {
    /// A fresh fixture in `Scheduled` with no result.
    pub fn scheduled(
        id: impl Into<FixtureId>,
        league_id: impl Into<LeagueId>,
        round: u32,
        team_a_id: impl Into<ClubId>,
        team_b_id: impl Into<ClubId>,
        scheduled_date: NaiveDate,
    ) -> Self {
        Fixture {
            id: id.into(),
            league_id: league_id.into(),
            round,
            team_a_id: team_a_id.into(),
            team_b_id: team_b_id.into(),
            scheduled_date,
            scheduled_time: None,
            status: FixtureStatus::Scheduled,
            result: None,
            player_stats: None,
            referee_id: None,
            pitch_id: None,
            stats_applied: false,
            score_history: Vec::new(),
            version: 0,
        }
    }

    /// Whether `club_id` plays in this fixture.
    pub fn involves(&self, club_id: &str) -> bool {
        self.team_a_id == club_id || self.team_b_id == club_id
    }
}

// ---------------------------------------------------------------------------
// Standings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandingsEntry {
    pub club_id: ClubId,
    pub club_name: String,
    /// 1-based, dense and never shared.
    pub position: u32,
    pub matches_played: u32,
    pub matches_won: u32,
    pub matches_drawn: u32,
    pub matches_lost: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub goal_difference: i64,
    pub points: u32,
}

impl StandingsEntry {
    pub fn new(club_id: impl Into<ClubId>, club_name: impl Into<String>) -> Self {
        StandingsEntry {
            club_id: club_id.into(),
            club_name: club_name.into(),
            position: 0,
            matches_played: 0,
            matches_won: 0,
            matches_drawn: 0,
            matches_lost: 0,
            goals_for: 0,
            goals_against: 0,
            goal_difference: 0,
            points: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Clubs and player profiles
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Club {
    pub id: ClubId,
    pub name: String,
    #[serde(default)]
    pub player_ids: Vec<PlayerId>,
}

/// Cumulative statistics stored on a player profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub goals: u32,
    pub assists: u32,
    pub matches_played: u32,
    pub matches_won: u32,
    pub matches_drawn: u32,
    pub matches_lost: u32,
    pub yellow_cards: u32,
    pub red_cards: u32,
}

impl std::ops::AddAssign<&PlayerStats> for PlayerStats {
    fn add_assign(&mut self, other: &PlayerStats) {
        self.goals += other.goals;
        self.assists += other.assists;
        self.matches_played += other.matches_played;
        self.matches_won += other.matches_won;
        self.matches_drawn += other.matches_drawn;
        self.matches_lost += other.matches_lost;
        self.yellow_cards += other.yellow_cards;
        self.red_cards += other.red_cards;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: PlayerId,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub club_id: Option<ClubId>,
    #[serde(default)]
    pub stats: PlayerStats,
}

impl Profile {
    /// A zero-initialized profile, used when stats arrive for a player that
    /// has no profile yet.
    pub fn empty(id: impl Into<PlayerId>) -> Self {
        Profile {
            id: id.into(),
            display_name: String::new(),
            club_id: None,
            stats: PlayerStats::default(),
        }
    }
}

/// Partial profile update. `None` fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub club_id: Option<ClubId>,
    pub stats: Option<PlayerStats>,
}

impl ProfileUpdate {
    pub fn stats(stats: PlayerStats) -> Self {
        ProfileUpdate {
            stats: Some(stats),
            ..Default::default()
        }
    }

    /// Merge this update into `profile`.
    pub fn apply_to(self, profile: &mut Profile) {
        if let Some(name) = self.display_name {
            profile.display_name = name;
        }
        if let Some(club_id) = self.club_id {
            profile.club_id = Some(club_id);
        }
        if let Some(stats) = self.stats {
            profile.stats = stats;
        }
    }
}
