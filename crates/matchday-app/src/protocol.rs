// Line protocol between clients and the matchday process.
//
// Each stdin line is one JSON request tagged by `type`; an optional `id` is
// echoed on the matching response so clients can correlate out-of-order
// replies.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

use matchday_core::model::{Club, FixtureStatus, PlayerMatchStat, PointsSystem};
use matchday_core::Error;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    CreateLeague {
        #[serde(default)]
        league_id: Option<String>,
        name: String,
        #[serde(default)]
        points_system: Option<PointsSystem>,
    },
    GetLeague {
        league_id: String,
    },
    AddDivision {
        league_id: String,
        name: String,
    },
    RegisterClub {
        league_id: String,
        division_id: String,
        club: Club,
    },
    GenerateFixtures {
        league_id: String,
        start_date: NaiveDate,
    },
    ActivateLeague {
        league_id: String,
    },
    CloseSeason {
        league_id: String,
    },
    StartFixture {
        fixture_id: String,
        #[serde(default)]
        version: Option<u64>,
    },
    /// `now` defaults to the local wall clock.
    AutoAdvance {
        league_id: String,
        #[serde(default)]
        now: Option<NaiveDateTime>,
    },
    UpdateScores {
        fixture_id: String,
        score_a: i64,
        score_b: i64,
        #[serde(default)]
        recorded_at: Option<DateTime<Utc>>,
        #[serde(default)]
        version: Option<u64>,
    },
    RecordPlayerStats {
        fixture_id: String,
        stats: Vec<PlayerMatchStat>,
        #[serde(default)]
        version: Option<u64>,
    },
    CompleteFixture {
        fixture_id: String,
        #[serde(default)]
        version: Option<u64>,
    },
    CancelFixture {
        fixture_id: String,
        #[serde(default)]
        version: Option<u64>,
    },
    DisqualifyClub {
        league_id: String,
        club_id: String,
    },
    ApplyPlayerStats {
        fixture_id: String,
    },
    ListFixtures {
        league_id: String,
        #[serde(default)]
        status: Option<FixtureStatus>,
        #[serde(default)]
        club_id: Option<String>,
        #[serde(default)]
        round: Option<u32>,
    },
    Standings {
        league_id: String,
    },
    RecomputeStandings {
        league_id: String,
    },
    ExportStandings {
        league_id: String,
    },
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    InvalidState,
    Validation,
    Conflict,
    Storage,
    Internal,
}

impl From<&Error> for ErrorKind {
    fn from(e: &Error) -> Self {
        match e {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::InvalidState { .. } | Error::InvalidLeagueState { .. } => ErrorKind::InvalidState,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Conflict { .. } => ErrorKind::Conflict,
            Error::Storage(_) => ErrorKind::Storage,
            Error::Serialization(_) | Error::Export(_) => ErrorKind::Internal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Response {
    pub fn success(data: Value) -> Self {
        Response {
            id: None,
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Response {
            id: None,
            ok: false,
            data: None,
            error: Some(ErrorBody {
                kind,
                message: message.into(),
            }),
        }
    }

    pub fn from_error(e: &Error) -> Self {
        Response::failure(ErrorKind::from(e), e.to_string())
    }

    pub fn with_id(mut self, id: Option<Value>) -> Self {
        self.id = id;
        self
    }

    /// The failure kind, if this is an error response.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// Parse one input line into its correlation ID and request. A malformed
/// line becomes a ready-to-send `bad_request` response.
pub fn parse_line(line: &str) -> Result<(Option<Value>, Request), Response> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| Response::failure(ErrorKind::BadRequest, format!("invalid JSON: {e}")))?;
    let id = value.get("id").cloned();

    let request = serde_json::from_value(value).map_err(|e| {
        Response::failure(ErrorKind::BadRequest, format!("invalid request: {e}")).with_id(id.clone())
    })?;
    Ok((id, request))
}

/// Hand a response to the writer task. Returns `false`, after logging, if
/// the writer is gone.
pub async fn send_response(out: &mpsc::Sender<Response>, response: Response) -> bool {
    let id = response.id.clone();
    if out.send(response).await.is_err() {
        warn!("Response channel closed, dropping response {:?}", id);
        return false;
    }
    true
}
