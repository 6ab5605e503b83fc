// SQLite persistence for leagues, fixtures, clubs and player profiles.
//
// Each record is stored as a JSON document next to a `version` column. Fixture
// rows also carry the columns `FixtureFilter` queries on.

use std::sync::{Mutex, MutexGuard};

use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{Club, Fixture, League, PlayerStats, Profile, ProfileUpdate};
use crate::repository::{
    BatchRepository, ClubRepository, Committed, FixtureFilter, FixtureRepository,
    LeagueRepository, PlayerProfileRepository, WriteBatch,
};

/// SQLite-backed implementation of every repository trait.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS leagues (
                id      TEXT PRIMARY KEY,
                version INTEGER NOT NULL,
                doc     TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS fixtures (
                id        TEXT PRIMARY KEY,
                league_id TEXT NOT NULL REFERENCES leagues(id),
                status    TEXT NOT NULL,
                round     INTEGER NOT NULL,
                team_a_id TEXT NOT NULL,
                team_b_id TEXT NOT NULL,
                version   INTEGER NOT NULL,
                doc       TEXT NOT NULL,
                CHECK (team_a_id <> team_b_id)
            );

            CREATE INDEX IF NOT EXISTS idx_fixtures_league ON fixtures(league_id, round);

            CREATE TABLE IF NOT EXISTS clubs (
                id  TEXT PRIMARY KEY,
                doc TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS profiles (
                id  TEXT PRIMARY KEY,
                doc TEXT NOT NULL
            );
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }
}

fn to_doc<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn from_doc<T: DeserializeOwned>(doc: &str) -> Result<T> {
    Ok(serde_json::from_str(doc)?)
}

fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(e, rusqlite::Error::SqliteFailure(f, _) if f.code == ErrorCode::ConstraintViolation)
}

/// Decode a `(doc, version)` row, trusting the column over the document.
fn fixture_from_row(doc: &str, version: i64) -> Result<Fixture> {
    let mut fixture: Fixture = from_doc(doc)?;
    fixture.version = version as u64;
    Ok(fixture)
}

/// Map a zero-row versioned UPDATE to `Conflict` or `NotFound`.
fn stale_or_missing(
    conn: &Connection,
    table: &str,
    entity: &'static str,
    id: &str,
    expected: u64,
) -> Result<Error> {
    let exists: bool = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE id = ?1)"),
        params![id],
        |row| row.get(0),
    )?;
    Ok(if exists {
        Error::Conflict {
            entity,
            id: id.to_string(),
            expected,
        }
    } else {
        Error::not_found(entity, id)
    })
}

// The `*_in` helpers take a bare connection so that single writes and batch
// commits share the same statements. A `Transaction` derefs to `Connection`.

fn save_league_in(conn: &Connection, league: &League) -> Result<League> {
    let mut stored = league.clone();
    stored.version = league.version + 1;
    let doc = to_doc(&stored)?;

    let changed = conn.execute(
        "UPDATE leagues SET doc = ?1, version = ?2 WHERE id = ?3 AND version = ?4",
        params![doc, stored.version as i64, league.id, league.version as i64],
    )?;
    if changed == 0 {
        return Err(stale_or_missing(conn, "leagues", "league", &league.id, league.version)?);
    }
    Ok(stored)
}

fn insert_fixtures_in(conn: &Connection, fixtures: &[Fixture]) -> Result<()> {
    for fixture in fixtures {
        if fixture.team_a_id == fixture.team_b_id {
            return Err(Error::validation(format!(
                "fixture {} pairs club {} with itself",
                fixture.id, fixture.team_a_id
            )));
        }
        let mut stored = fixture.clone();
        stored.version = 1;
        conn.execute(
            "INSERT INTO fixtures (id, league_id, status, round, team_a_id, team_b_id, version, doc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
            params![
                stored.id,
                stored.league_id,
                stored.status.as_str(),
                stored.round,
                stored.team_a_id,
                stored.team_b_id,
                to_doc(&stored)?,
            ],
        )?;
    }
    Ok(())
}

fn save_fixture_in(conn: &Connection, fixture: &Fixture) -> Result<Fixture> {
    let mut stored = fixture.clone();
    stored.version = fixture.version + 1;
    let doc = to_doc(&stored)?;

    let changed = conn.execute(
        "UPDATE fixtures SET status = ?1, doc = ?2, version = ?3
         WHERE id = ?4 AND version = ?5",
        params![
            stored.status.as_str(),
            doc,
            stored.version as i64,
            fixture.id,
            fixture.version as i64,
        ],
    )?;
    if changed == 0 {
        return Err(stale_or_missing(conn, "fixtures", "fixture", &fixture.id, fixture.version)?);
    }
    Ok(stored)
}

/// Read the profile (or start an empty one), apply `change` and write it
/// back. Callers run this inside a transaction.
fn merge_profile_in(
    conn: &Connection,
    player_id: &str,
    change: impl FnOnce(&mut Profile),
) -> Result<Profile> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT doc FROM profiles WHERE id = ?1",
            params![player_id],
            |row| row.get(0),
        )
        .optional()?;
    let mut profile = match existing {
        Some(doc) => from_doc(&doc)?,
        None => Profile::empty(player_id),
    };
    change(&mut profile);

    conn.execute(
        "INSERT OR REPLACE INTO profiles (id, doc) VALUES (?1, ?2)",
        params![player_id, to_doc(&profile)?],
    )?;
    Ok(profile)
}

// ---------------------------------------------------------------------------
// Leagues
// ---------------------------------------------------------------------------

impl LeagueRepository for Database {
    fn get_league(&self, league_id: &str) -> Result<League> {
        let conn = self.conn();
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT doc, version FROM leagues WHERE id = ?1",
                params![league_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (doc, version) = row.ok_or_else(|| Error::not_found("league", league_id))?;
        let mut league: League = from_doc(&doc)?;
        league.version = version as u64;
        Ok(league)
    }

    fn insert_league(&self, league: &League) -> Result<League> {
        let mut stored = league.clone();
        stored.version = 1;
        let doc = to_doc(&stored)?;

        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT INTO leagues (id, version, doc) VALUES (?1, 1, ?2)",
            params![stored.id, doc],
        );
        match inserted {
            Ok(_) => Ok(stored),
            Err(e) if is_constraint_violation(&e) => Err(Error::Conflict {
                entity: "league",
                id: stored.id,
                expected: 0,
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn save_league(&self, league: &League) -> Result<League> {
        save_league_in(&self.conn(), league)
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

impl FixtureRepository for Database {
    fn get_fixture(&self, fixture_id: &str) -> Result<Fixture> {
        let conn = self.conn();
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT doc, version FROM fixtures WHERE id = ?1",
                params![fixture_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (doc, version) = row.ok_or_else(|| Error::not_found("fixture", fixture_id))?;
        fixture_from_row(&doc, version)
    }

    fn list_fixtures(&self, filter: &FixtureFilter) -> Result<Vec<Fixture>> {
        let mut sql = String::from("SELECT doc, version FROM fixtures WHERE 1 = 1");
        let mut args: Vec<Value> = Vec::new();

        if let Some(league_id) = &filter.league_id {
            args.push(Value::Text(league_id.clone()));
            sql.push_str(&format!(" AND league_id = ?{}", args.len()));
        }
        if let Some(status) = filter.status {
            args.push(Value::Text(status.as_str().to_string()));
            sql.push_str(&format!(" AND status = ?{}", args.len()));
        }
        if let Some(club_id) = &filter.club_id {
            args.push(Value::Text(club_id.clone()));
            let n = args.len();
            sql.push_str(&format!(" AND (team_a_id = ?{n} OR team_b_id = ?{n})"));
        }
        if let Some(round) = filter.round {
            args.push(Value::Integer(i64::from(round)));
            sql.push_str(&format!(" AND round = ?{}", args.len()));
        }
        // rowid keeps generation order within a round.
        sql.push_str(" ORDER BY round, rowid");

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.iter()
            .map(|(doc, version)| fixture_from_row(doc, *version))
            .collect()
    }

    fn insert_fixtures(&self, fixtures: &[Fixture]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        insert_fixtures_in(&tx, fixtures)?;
        tx.commit()?;
        Ok(())
    }

    fn save_fixture(&self, fixture: &Fixture) -> Result<Fixture> {
        save_fixture_in(&self.conn(), fixture)
    }
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

impl BatchRepository for Database {
    /// League first, then fixture saves, then inserts. Dropping the
    /// transaction on any `?` rolls the whole batch back.
    fn commit(&self, batch: WriteBatch<'_>) -> Result<Committed> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let league = batch
            .league
            .map(|league| save_league_in(&tx, league))
            .transpose()?;
        let fixtures = batch
            .fixtures
            .iter()
            .map(|fixture| save_fixture_in(&tx, fixture))
            .collect::<Result<Vec<_>>>()?;
        insert_fixtures_in(&tx, batch.new_fixtures)?;

        tx.commit()?;
        Ok(Committed { league, fixtures })
    }
}

// ---------------------------------------------------------------------------
// Clubs
// ---------------------------------------------------------------------------

impl ClubRepository for Database {
    fn get_club(&self, club_id: &str) -> Result<Club> {
        let conn = self.conn();
        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM clubs WHERE id = ?1",
                params![club_id],
                |row| row.get(0),
            )
            .optional()?;
        let doc = doc.ok_or_else(|| Error::not_found("club", club_id))?;
        from_doc(&doc)
    }

    /// Insert or replace a club record.
    fn insert_club(&self, club: &Club) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO clubs (id, doc) VALUES (?1, ?2)",
            params![club.id, to_doc(club)?],
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Player profiles
// ---------------------------------------------------------------------------

impl PlayerProfileRepository for Database {
    fn get_profile(&self, player_id: &str) -> Result<Profile> {
        let conn = self.conn();
        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM profiles WHERE id = ?1",
                params![player_id],
                |row| row.get(0),
            )
            .optional()?;
        let doc = doc.ok_or_else(|| Error::not_found("profile", player_id))?;
        from_doc(&doc)
    }

    /// Read-merge-write inside one transaction so concurrent partial updates
    /// of the same profile cannot drop each other's fields.
    fn save_profile(&self, player_id: &str, update: ProfileUpdate) -> Result<Profile> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let profile = merge_profile_in(&tx, player_id, |profile| update.apply_to(profile))?;
        tx.commit()?;
        Ok(profile)
    }

    fn add_stats(&self, player_id: &str, delta: &PlayerStats) -> Result<Profile> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let profile = merge_profile_in(&tx, player_id, |profile| profile.stats += delta)?;
        tx.commit()?;
        Ok(profile)
    }
}
