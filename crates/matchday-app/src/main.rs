// Matchday entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file; stdout carries responses)
// 2. Load config
// 3. Open database
// 4. Build the engine and the league hub
// 5. Spawn the response writer task
// 6. Read requests from stdin until EOF or a shutdown request
// 7. Drain in-flight requests and workers

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use matchday_app::hub::LeagueHub;
use matchday_app::protocol::{self, Request, Response};
use matchday_core::config;
use matchday_core::db::Database;
use matchday_core::engine::LeagueEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize tracing
    init_tracing()?;
    info!("Matchday starting up");

    // 2. Load config
    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: points {}/{}/{}, {} days between rounds",
        config.points.win, config.points.draw, config.points.loss, config.schedule.days_between_rounds
    );

    // 3. Open database
    let db_path = config::resolve_db_path(&config).context("failed to resolve database path")?;
    let db_path_str = db_path.to_string_lossy().into_owned();
    let db = Database::open(&db_path_str).context("failed to open database")?;
    info!("Database opened at {}", db_path_str);

    // 4. Engine and hub
    let hub = Arc::new(LeagueHub::new(LeagueEngine::new(db, config)));

    // 5. Response writer
    let (out_tx, mut out_rx) = mpsc::channel::<Response>(256);
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(response) = out_rx.recv().await {
            let mut line = serde_json::to_string(&response).context("failed to encode response")?;
            line.push('\n');
            stdout.write_all(line.as_bytes()).await?;
            stdout.flush().await?;
        }
        Ok::<_, anyhow::Error>(())
    });

    // 6. Request loop
    let mut in_flight = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }

        let (id, request) = match protocol::parse_line(&line) {
            Ok(parsed) => parsed,
            Err(response) => {
                warn!("Rejected malformed request");
                if !protocol::send_response(&out_tx, response).await {
                    break;
                }
                continue;
            }
        };

        if request == Request::Shutdown {
            info!("Shutdown requested");
            protocol::send_response(&out_tx, Response::success(serde_json::Value::Null).with_id(id)).await;
            break;
        }

        let hub = Arc::clone(&hub);
        let tx = out_tx.clone();
        in_flight.spawn(async move {
            let response = hub.dispatch(request).await.with_id(id);
            protocol::send_response(&tx, response).await;
        });
    }

    // 7. Cleanup
    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            error!("Request task failed: {}", e);
        }
    }
    hub.shutdown().await;

    drop(out_tx);
    writer
        .await
        .context("response writer panicked")?
        .context("failed to write responses")?;

    info!("Matchday shut down cleanly");
    Ok(())
}

/// Initialize tracing to log to a file (stdout is the response channel).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("matchday.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("matchday=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")?;

    Ok(())
}
