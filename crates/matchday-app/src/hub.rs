// Per-league single-writer dispatch.
//
// Every league gets one worker task fed by an mpsc channel. Mutating
// requests for a league are queued on its worker and answered over a
// oneshot channel, so two writes to the same league never interleave.
// Reads go straight to the engine. Workers are only spawned for leagues
// that exist (or are being created) and exit after sitting idle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, Utc};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use matchday_core::engine::LeagueEngine;
use matchday_core::repository::{FixtureFilter, Store};

use crate::protocol::{ErrorKind, Request, Response};

/// Queued commands per league before senders wait.
const COMMAND_BUFFER: usize = 64;

/// How long a league worker waits for a command before it exits.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

type WorkerMap = Arc<Mutex<HashMap<String, Worker>>>;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("worker for league {league_id} is no longer running")]
    WorkerGone { league_id: String },

    #[error(transparent)]
    Engine(#[from] matchday_core::Error),
}

impl HubError {
    fn into_response(self) -> Response {
        match self {
            HubError::Engine(e) => Response::from_error(&e),
            other => Response::failure(ErrorKind::Internal, other.to_string()),
        }
    }
}

struct Command {
    request: Request,
    reply: oneshot::Sender<matchday_core::Result<Value>>,
}

struct Worker {
    tx: mpsc::Sender<Command>,
    handle: JoinHandle<()>,
}

/// Where a request is executed.
enum Route {
    /// Queued on the league's worker. `creates` is set for the request that
    /// brings the league into existence.
    League { league_id: String, creates: bool },
    /// Executed immediately on the calling task.
    Direct,
}

pub struct LeagueHub<S> {
    engine: Arc<LeagueEngine<S>>,
    workers: WorkerMap,
    idle_timeout: Duration,
}

impl<S> LeagueHub<S>
where
    S: Store + Send + Sync + 'static,
{
    pub fn new(engine: LeagueEngine<S>) -> Self {
        Self::with_idle_timeout(engine, DEFAULT_IDLE_TIMEOUT)
    }

    pub fn with_idle_timeout(engine: LeagueEngine<S>, idle_timeout: Duration) -> Self {
        LeagueHub {
            engine: Arc::new(engine),
            workers: Arc::new(Mutex::new(HashMap::new())),
            idle_timeout,
        }
    }

    pub fn engine(&self) -> &LeagueEngine<S> {
        &self.engine
    }

    /// Execute one request and build its response.
    pub async fn dispatch(&self, request: Request) -> Response {
        match self.try_dispatch(request).await {
            Ok(data) => Response::success(data),
            Err(e) => {
                debug!("Request failed: {}", e);
                e.into_response()
            }
        }
    }

    async fn try_dispatch(&self, mut request: Request) -> Result<Value, HubError> {
        if let Request::CreateLeague { league_id, .. } = &mut request {
            league_id.get_or_insert_with(|| Uuid::new_v4().to_string());
        }

        match self.route(&request)? {
            Route::Direct => Ok(execute(&self.engine, request)?),
            Route::League { league_id, creates } => {
                let (reply, rx) = oneshot::channel();
                self.enqueue(&league_id, creates, Command { request, reply })
                    .await?;
                let result = rx.await.map_err(|_| HubError::WorkerGone { league_id })?;
                Ok(result?)
            }
        }
    }

    /// Queue `command` on the league's worker. A worker that went idle
    /// between lookup and send has closed its channel, so the command is
    /// handed to a fresh one.
    async fn enqueue(&self, league_id: &str, creates: bool, command: Command) -> Result<(), HubError> {
        let tx = self.sender_for(league_id, creates).await?;
        let Err(mpsc::error::SendError(command)) = tx.send(command).await else {
            return Ok(());
        };

        debug!("Worker for league {} retired mid-send, respawning", league_id);
        let tx = self.sender_for(league_id, creates).await?;
        tx.send(command).await.map_err(|_| HubError::WorkerGone {
            league_id: league_id.to_string(),
        })
    }

    fn route(&self, request: &Request) -> Result<Route, HubError> {
        let route = match request {
            Request::CreateLeague { league_id, .. } => Route::League {
                league_id: league_id.clone().unwrap_or_default(),
                creates: true,
            },
            Request::AddDivision { league_id, .. }
            | Request::RegisterClub { league_id, .. }
            | Request::GenerateFixtures { league_id, .. }
            | Request::ActivateLeague { league_id }
            | Request::CloseSeason { league_id }
            | Request::AutoAdvance { league_id, .. }
            | Request::DisqualifyClub { league_id, .. }
            | Request::RecomputeStandings { league_id } => Route::League {
                league_id: league_id.clone(),
                creates: false,
            },
            Request::StartFixture { fixture_id, .. }
            | Request::UpdateScores { fixture_id, .. }
            | Request::RecordPlayerStats { fixture_id, .. }
            | Request::CompleteFixture { fixture_id, .. }
            | Request::CancelFixture { fixture_id, .. }
            | Request::ApplyPlayerStats { fixture_id } => {
                // A fixture never moves between leagues, so this read is safe
                // outside the worker.
                Route::League {
                    league_id: self.engine.fixture(fixture_id)?.league_id,
                    creates: false,
                }
            }
            Request::GetLeague { .. }
            | Request::ListFixtures { .. }
            | Request::Standings { .. }
            | Request::ExportStandings { .. }
            | Request::Shutdown => Route::Direct,
        };
        Ok(route)
    }

    /// The live worker's sender, spawning a worker if there is none. Unknown
    /// leagues fail `NotFound` without spawning, unless `creates` is set.
    async fn sender_for(&self, league_id: &str, creates: bool) -> Result<mpsc::Sender<Command>, HubError> {
        let mut workers = self.workers.lock().await;
        if let Some(worker) = workers.get(league_id) {
            if !worker.tx.is_closed() {
                return Ok(worker.tx.clone());
            }
        }
        if !creates {
            self.engine.league(league_id)?;
        }

        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = tokio::spawn(run_worker(
            league_id.to_string(),
            Arc::clone(&self.engine),
            rx,
            Arc::clone(&self.workers),
            self.idle_timeout,
        ));
        workers.insert(
            league_id.to_string(),
            Worker {
                tx: tx.clone(),
                handle,
            },
        );
        debug!("Spawned worker for league {}", league_id);
        Ok(tx)
    }

    /// Number of live league workers.
    pub async fn worker_count(&self) -> usize {
        self.workers.lock().await.len()
    }

    /// Close every worker channel and wait for queued commands to drain.
    pub async fn shutdown(&self) {
        let workers: Vec<(String, Worker)> = self.workers.lock().await.drain().collect();
        for (league_id, worker) in workers {
            drop(worker.tx);
            if let Err(e) = worker.handle.await {
                warn!("Worker for league {} ended abnormally: {}", league_id, e);
            }
        }
        info!("League hub shut down");
    }
}

async fn run_worker<S>(
    league_id: String,
    engine: Arc<LeagueEngine<S>>,
    mut rx: mpsc::Receiver<Command>,
    workers: WorkerMap,
    idle_timeout: Duration,
) where
    S: Store + Send + Sync + 'static,
{
    debug!("Worker for league {} started", league_id);
    loop {
        match tokio::time::timeout(idle_timeout, rx.recv()).await {
            Ok(Some(command)) => serve(&engine, &league_id, command),
            Ok(None) => break,
            Err(_) => {
                // Holding the map lock until the queue is drained keeps a
                // replacement worker from running alongside this one.
                let mut map = workers.lock().await;
                rx.close();
                while let Some(command) = rx.recv().await {
                    serve(&engine, &league_id, command);
                }
                if map.get(&league_id).is_some_and(|w| w.tx.is_closed()) {
                    map.remove(&league_id);
                }
                debug!("Worker for league {} idle, retiring", league_id);
                break;
            }
        }
    }
    debug!("Worker for league {} stopped", league_id);
}

fn serve<S: Store>(engine: &LeagueEngine<S>, league_id: &str, command: Command) {
    let Command { request, reply } = command;
    let result = execute(engine, request);
    if reply.send(result).is_err() {
        debug!("Caller for league {} went away before the reply", league_id);
    }
}

/// Run a request against the engine and serialize what it returns.
pub fn execute<S: Store>(engine: &LeagueEngine<S>, request: Request) -> matchday_core::Result<Value> {
    let value = match request {
        Request::CreateLeague {
            league_id,
            name,
            points_system,
        } => serde_json::to_value(engine.create_league(league_id, &name, points_system)?)?,
        Request::GetLeague { league_id } => serde_json::to_value(engine.league(&league_id)?)?,
        Request::AddDivision { league_id, name } => {
            serde_json::to_value(engine.add_division(&league_id, &name)?)?
        }
        Request::RegisterClub {
            league_id,
            division_id,
            club,
        } => serde_json::to_value(engine.register_club(&league_id, &division_id, club)?)?,
        Request::GenerateFixtures {
            league_id,
            start_date,
        } => serde_json::to_value(engine.generate_fixtures(&league_id, start_date)?)?,
        Request::ActivateLeague { league_id } => {
            serde_json::to_value(engine.activate_league(&league_id)?)?
        }
        Request::CloseSeason { league_id } => serde_json::to_value(engine.close_season(&league_id)?)?,
        Request::StartFixture {
            fixture_id,
            version,
        } => serde_json::to_value(engine.start_fixture(&fixture_id, version)?)?,
        Request::AutoAdvance { league_id, now } => {
            let now = now.unwrap_or_else(|| Local::now().naive_local());
            serde_json::to_value(engine.auto_advance(&league_id, now)?)?
        }
        Request::UpdateScores {
            fixture_id,
            score_a,
            score_b,
            recorded_at,
            version,
        } => {
            let at = recorded_at.unwrap_or_else(Utc::now);
            serde_json::to_value(engine.update_scores(&fixture_id, score_a, score_b, at, version)?)?
        }
        Request::RecordPlayerStats {
            fixture_id,
            stats,
            version,
        } => serde_json::to_value(engine.record_player_stats(&fixture_id, stats, version)?)?,
        Request::CompleteFixture {
            fixture_id,
            version,
        } => serde_json::to_value(engine.complete_fixture(&fixture_id, version)?)?,
        Request::CancelFixture {
            fixture_id,
            version,
        } => serde_json::to_value(engine.cancel_fixture(&fixture_id, version)?)?,
        Request::DisqualifyClub { league_id, club_id } => {
            serde_json::to_value(engine.disqualify_club(&league_id, &club_id)?)?
        }
        Request::ApplyPlayerStats { fixture_id } => {
            serde_json::to_value(engine.apply_player_stats(&fixture_id)?)?
        }
        Request::ListFixtures {
            league_id,
            status,
            club_id,
            round,
        } => {
            let filter = FixtureFilter {
                league_id: Some(league_id),
                status,
                club_id,
                round,
            };
            serde_json::to_value(engine.list_fixtures(&filter)?)?
        }
        Request::Standings { league_id } => serde_json::to_value(engine.standings(&league_id)?)?,
        Request::RecomputeStandings { league_id } => {
            serde_json::to_value(engine.recompute_standings(&league_id)?)?
        }
        Request::ExportStandings { league_id } => Value::String(engine.export_standings_csv(&league_id)?),
        Request::Shutdown => Value::Null,
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use matchday_core::config::Config;
    use matchday_core::db::Database;
    use matchday_core::model::{Club, Fixture, FixtureStatus, LeagueStatus, StandingsEntry};
    use serde_json::json;

    fn hub() -> Arc<LeagueHub<Database>> {
        let db = Database::open(":memory:").expect("in-memory database should open");
        Arc::new(LeagueHub::new(LeagueEngine::new(db, Config::default())))
    }

    fn hub_with_idle_timeout(idle: Duration) -> Arc<LeagueHub<Database>> {
        let db = Database::open(":memory:").expect("in-memory database should open");
        Arc::new(LeagueHub::with_idle_timeout(
            LeagueEngine::new(db, Config::default()),
            idle,
        ))
    }

    async fn ok(hub: &LeagueHub<Database>, request: Request) -> Value {
        let response = hub.dispatch(request).await;
        assert!(response.ok, "request failed: {:?}", response.error);
        response.data.unwrap_or(Value::Null)
    }

    /// League `l1` with clubs A and B, fixtures generated and activated.
    async fn two_club_league(hub: &LeagueHub<Database>) -> Vec<Fixture> {
        ok(
            hub,
            Request::CreateLeague {
                league_id: Some("l1".into()),
                name: "Sunday League".into(),
                points_system: None,
            },
        )
        .await;
        let division = ok(
            hub,
            Request::AddDivision {
                league_id: "l1".into(),
                name: "Premier".into(),
            },
        )
        .await;
        let division_id = division["id"].as_str().unwrap().to_string();

        for id in ["A", "B"] {
            ok(
                hub,
                Request::RegisterClub {
                    league_id: "l1".into(),
                    division_id: division_id.clone(),
                    club: Club {
                        id: id.into(),
                        name: format!("{id} Rovers"),
                        player_ids: Vec::new(),
                    },
                },
            )
            .await;
        }

        let fixtures = ok(
            hub,
            Request::GenerateFixtures {
                league_id: "l1".into(),
                start_date: NaiveDate::from_ymd_opt(2026, 10, 4).unwrap(),
            },
        )
        .await;
        ok(hub, Request::ActivateLeague { league_id: "l1".into() }).await;
        serde_json::from_value(fixtures).unwrap()
    }

    #[tokio::test]
    async fn create_league_without_id_gets_one() {
        let hub = hub();
        let league = ok(
            &hub,
            Request::CreateLeague {
                league_id: None,
                name: "Midweek".into(),
                points_system: None,
            },
        )
        .await;
        let id = league["id"].as_str().unwrap();
        assert!(!id.is_empty());
        assert_eq!(league["status"], json!(LeagueStatus::Registration));
        assert_eq!(hub.worker_count().await, 1);
    }

    #[tokio::test]
    async fn full_match_flow_updates_standings() {
        let hub = hub();
        let fixtures = two_club_league(&hub).await;
        assert_eq!(fixtures.len(), 2);
        let id = fixtures[0].id.clone();

        ok(&hub, Request::StartFixture { fixture_id: id.clone(), version: None }).await;
        ok(
            &hub,
            Request::UpdateScores {
                fixture_id: id.clone(),
                score_a: 3,
                score_b: 1,
                recorded_at: None,
                version: None,
            },
        )
        .await;
        let completion = ok(&hub, Request::CompleteFixture { fixture_id: id.clone(), version: None }).await;
        assert_eq!(completion["fixture"]["status"], json!(FixtureStatus::Completed));

        let table: Vec<StandingsEntry> =
            serde_json::from_value(ok(&hub, Request::Standings { league_id: "l1".into() }).await).unwrap();
        assert_eq!(table[0].club_id, fixtures[0].team_a_id);
        assert_eq!(table[0].points, 3);

        let csv = ok(&hub, Request::ExportStandings { league_id: "l1".into() }).await;
        assert!(csv.as_str().unwrap().starts_with("position,"));
    }

    #[tokio::test]
    async fn concurrent_score_updates_are_serialized() {
        let hub = hub();
        let fixtures = two_club_league(&hub).await;
        let id = fixtures[0].id.clone();
        ok(&hub, Request::StartFixture { fixture_id: id.clone(), version: None }).await;

        let mut tasks = tokio::task::JoinSet::new();
        for goals in 0..10 {
            let hub = Arc::clone(&hub);
            let fixture_id = id.clone();
            tasks.spawn(async move {
                hub.dispatch(Request::UpdateScores {
                    fixture_id,
                    score_a: goals,
                    score_b: 0,
                    recorded_at: None,
                    version: None,
                })
                .await
            });
        }
        while let Some(joined) = tasks.join_next().await {
            let response = joined.unwrap();
            assert!(response.ok, "update failed: {:?}", response.error);
        }

        let fixture = hub.engine().fixture(&id).unwrap();
        assert_eq!(fixture.score_history.len(), 10);
        // start + ten updates
        assert_eq!(fixture.version, 12);
    }

    #[tokio::test]
    async fn stale_version_is_reported_as_conflict() {
        let hub = hub();
        let fixtures = two_club_league(&hub).await;
        let fixture = &fixtures[0];

        ok(
            &hub,
            Request::StartFixture {
                fixture_id: fixture.id.clone(),
                version: Some(fixture.version),
            },
        )
        .await;
        let response = hub
            .dispatch(Request::CancelFixture {
                fixture_id: fixture.id.clone(),
                version: Some(fixture.version),
            })
            .await;
        assert_eq!(response.error_kind(), Some(ErrorKind::Conflict));
    }

    #[tokio::test]
    async fn errors_map_to_kinds() {
        let hub = hub();
        let fixtures = two_club_league(&hub).await;

        let missing = hub
            .dispatch(Request::StartFixture {
                fixture_id: "nope".into(),
                version: None,
            })
            .await;
        assert_eq!(missing.error_kind(), Some(ErrorKind::NotFound));

        let not_live = hub
            .dispatch(Request::CompleteFixture {
                fixture_id: fixtures[0].id.clone(),
                version: None,
            })
            .await;
        assert_eq!(not_live.error_kind(), Some(ErrorKind::InvalidState));

        ok(&hub, Request::StartFixture { fixture_id: fixtures[0].id.clone(), version: None }).await;
        let negative = hub
            .dispatch(Request::UpdateScores {
                fixture_id: fixtures[0].id.clone(),
                score_a: -1,
                score_b: 2,
                recorded_at: None,
                version: None,
            })
            .await;
        assert_eq!(negative.error_kind(), Some(ErrorKind::Validation));
    }

    #[tokio::test]
    async fn shutdown_drains_workers() {
        let hub = hub();
        two_club_league(&hub).await;
        assert_eq!(hub.worker_count().await, 1);

        hub.shutdown().await;
        assert_eq!(hub.worker_count().await, 0);

        // A later request simply starts a fresh worker.
        ok(&hub, Request::RecomputeStandings { league_id: "l1".into() }).await;
        assert_eq!(hub.worker_count().await, 1);
    }

    #[tokio::test]
    async fn unknown_leagues_do_not_spawn_workers() {
        let hub = hub();
        for i in 0..50 {
            let response = hub
                .dispatch(Request::RecomputeStandings {
                    league_id: format!("ghost-{i}"),
                })
                .await;
            assert_eq!(response.error_kind(), Some(ErrorKind::NotFound));
        }
        let response = hub
            .dispatch(Request::DisqualifyClub {
                league_id: "ghost".into(),
                club_id: "A".into(),
            })
            .await;
        assert_eq!(response.error_kind(), Some(ErrorKind::NotFound));
        assert_eq!(hub.worker_count().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_workers_are_retired() {
        let hub = hub_with_idle_timeout(Duration::from_secs(60));
        two_club_league(&hub).await;
        assert_eq!(hub.worker_count().await, 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(hub.worker_count().await, 1);

        tokio::time::sleep(Duration::from_secs(31)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(hub.worker_count().await, 0);

        // The league is still there; the next write spawns a new worker.
        ok(&hub, Request::RecomputeStandings { league_id: "l1".into() }).await;
        assert_eq!(hub.worker_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn busy_worker_is_kept() {
        let hub = hub_with_idle_timeout(Duration::from_secs(60));
        two_club_league(&hub).await;

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_secs(45)).await;
            ok(&hub, Request::RecomputeStandings { league_id: "l1".into() }).await;
            assert_eq!(hub.worker_count().await, 1);
        }
    }
}
