//! JSON-over-HTTP adapter. The caller's identity arrives in the `x-user-id`
//! header, set by whatever authenticates requests in front of the engine.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::advancement::{MatchupOutcome, RoundReport};
use crate::error::{BracketError, BracketResult};
use crate::ledger::VoteReceipt;
use crate::query::{ConsoleView, TournamentView};
use crate::types::{
    CompetitorId, MatchupId, NewTournament, SharedService, TournamentId, TournamentSummary, VotingWindow, CALLER_HEADER,
};
use crate::voting_window::CloseReport;

// ── Errors ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: &'static str,
}

impl BracketError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BracketError::NotFound(_) => StatusCode::NOT_FOUND,
            BracketError::InvalidState(_) | BracketError::Conflict(_) => StatusCode::CONFLICT,
            BracketError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            BracketError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            BracketError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<BracketError> for ErrorResponse {
    fn from(err: BracketError) -> Self {
        Self {
            kind: err.kind().as_str(),
            error: err.to_string(),
        }
    }
}

impl IntoResponse for BracketError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Request failed: {self}");
        }
        (status, Json(ErrorResponse::from(self))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, BracketError>;

// ── Request bodies ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartVotingRequest {
    pub round: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteRequest {
    pub competitor_id: CompetitorId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceRequest {
    #[serde(default)]
    pub force_winner_id: Option<CompetitorId>,
}

fn caller(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CALLER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

// ── Router ─────────────────────────────────────────────────────────────

pub fn router(service: SharedService) -> Router {
    Router::new()
        .route("/tournaments", get(list_tournaments).post(create_tournament))
        .route("/tournaments/:id", get(get_tournament))
        .route("/tournaments/:id/console", get(get_console))
        .route("/tournaments/:id/voting/start", post(start_voting))
        .route("/tournaments/:id/voting/end", post(end_voting))
        .route("/tournaments/:id/rounds/:round/advance-all", post(advance_round))
        .route("/matchups/:id/vote", post(cast_vote).delete(remove_vote))
        .route("/matchups/:id/advance", post(advance_matchup))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

pub async fn serve(service: SharedService, addr: &str) {
    let app = router(service);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Bracket server failed to bind {addr}: {e}");
            return;
        }
    };
    info!("Bracket server listening at http://{addr}/");
    if let Err(e) = axum::serve(listener, app).await {
        error!("Bracket server error: {e}");
    }
}

// ── Handlers ───────────────────────────────────────────────────────────

/// Service calls take std locks and may write tournament files, so they run on
/// the blocking pool rather than an async worker.
async fn blocking<T, F>(service: SharedService, call: F) -> Result<T, BracketError>
where
    T: Send + 'static,
    F: FnOnce(SharedService) -> BracketResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || call(service))
        .await
        .map_err(|e| BracketError::storage(format!("service task failed: {e}")))?
}

async fn list_tournaments(State(service): State<SharedService>) -> ApiResult<Vec<TournamentSummary>> {
    Ok(Json(blocking(service, |service| service.list_tournaments(Utc::now())).await?))
}

async fn create_tournament(
    State(service): State<SharedService>,
    Json(request): Json<NewTournament>,
) -> Result<(StatusCode, Json<TournamentView>), BracketError> {
    let view = blocking(service, move |service| service.create_tournament(request, Utc::now())).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_tournament(
    State(service): State<SharedService>,
    Path(id): Path<TournamentId>,
) -> ApiResult<TournamentView> {
    Ok(Json(blocking(service, move |service| service.view(id, Utc::now())).await?))
}

async fn get_console(
    State(service): State<SharedService>,
    Path(id): Path<TournamentId>,
    headers: HeaderMap,
) -> ApiResult<ConsoleView> {
    let user = caller(&headers);
    Ok(Json(blocking(service, move |service| service.console(id, user.as_deref())).await?))
}

async fn start_voting(
    State(service): State<SharedService>,
    Path(id): Path<TournamentId>,
    headers: HeaderMap,
    Json(body): Json<StartVotingRequest>,
) -> ApiResult<VotingWindow> {
    let user = caller(&headers);
    Ok(Json(
        blocking(service, move |service| service.open_voting(id, body.round, user.as_deref())).await?,
    ))
}

async fn end_voting(
    State(service): State<SharedService>,
    Path(id): Path<TournamentId>,
    headers: HeaderMap,
) -> ApiResult<CloseReport> {
    let user = caller(&headers);
    Ok(Json(
        blocking(service, move |service| service.close_voting(id, user.as_deref(), Utc::now())).await?,
    ))
}

async fn advance_round(
    State(service): State<SharedService>,
    Path((id, round)): Path<(TournamentId, u32)>,
    headers: HeaderMap,
) -> ApiResult<RoundReport> {
    let user = caller(&headers);
    Ok(Json(
        blocking(service, move |service| service.advance_round(id, round, user.as_deref(), Utc::now())).await?,
    ))
}

/// The voter is always the authenticated caller; anonymous when the header is absent.
async fn cast_vote(
    State(service): State<SharedService>,
    Path(matchup_id): Path<MatchupId>,
    headers: HeaderMap,
    Json(body): Json<CastVoteRequest>,
) -> ApiResult<VoteReceipt> {
    let voter = caller(&headers);
    Ok(Json(
        blocking(service, move |service| {
            service.cast_vote(matchup_id, voter.as_deref(), &body.competitor_id, Utc::now())
        })
        .await?,
    ))
}

async fn remove_vote(
    State(service): State<SharedService>,
    Path(matchup_id): Path<MatchupId>,
    headers: HeaderMap,
) -> ApiResult<VoteReceipt> {
    let voter = caller(&headers);
    Ok(Json(
        blocking(service, move |service| service.remove_vote(matchup_id, voter.as_deref())).await?,
    ))
}

async fn advance_matchup(
    State(service): State<SharedService>,
    Path(matchup_id): Path<MatchupId>,
    headers: HeaderMap,
    body: Option<Json<AdvanceRequest>>,
) -> ApiResult<MatchupOutcome> {
    let forced = body.and_then(|Json(body)| body.force_winner_id);
    let user = caller(&headers);
    Ok(Json(
        blocking(service, move |service| {
            service.advance_matchup(matchup_id, forced.as_deref(), user.as_deref(), Utc::now())
        })
        .await?,
    ))
}
