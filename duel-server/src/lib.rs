use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Reply};

use crate::auth::{AuthError, AuthService};
use crate::battle_service::BattleService;
use crate::websocket::ConnectionManager;
use duel_types::{BattleError, ModerationUpdate, PlayerIdentity};

pub mod auth;
pub mod battle_service;
pub mod config;
pub mod http_word_source;
pub mod websocket;

#[derive(Deserialize)]
struct CompletedQuery {
    since: Option<DateTime<Utc>>,
    limit: Option<u64>,
}

pub fn create_routes(
    connection_manager: Arc<ConnectionManager>,
    battle_service: Arc<BattleService>,
    auth_service: Arc<AuthService>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let connection_manager_filter = warp::any().map({
        let connection_manager = connection_manager.clone();
        move || connection_manager.clone()
    });

    let battle_service_filter = warp::any().map({
        let battle_service = battle_service.clone();
        move || battle_service.clone()
    });

    let auth_filter = warp::any().map({
        let auth_service = auth_service.clone();
        move || auth_service.clone()
    });

    // All mutations go through the WebSocket
    let websocket = warp::path("ws")
        .and(warp::ws())
        .and(connection_manager_filter.clone())
        .and(battle_service_filter.clone())
        .and(auth_filter.clone())
        .map(|ws: warp::ws::Ws, conn_mgr, service, auth| {
            ws.on_upgrade(move |socket| websocket::handle_connection(socket, conn_mgr, service, auth))
        });

    let health = warp::path("health")
        .and(warp::get())
        .map(|| warp::reply::with_status("OK", StatusCode::OK));

    let completed = warp::path!("battles" / "completed")
        .and(warp::get())
        .and(warp::query::<CompletedQuery>())
        .and(battle_service_filter.clone())
        .and_then(handle_completed_request);

    let snapshot = warp::path!("battles" / Uuid)
        .and(warp::get())
        .and(warp::header::optional::<String>("authorization"))
        .and(battle_service_filter.clone())
        .and(auth_filter.clone())
        .and_then(handle_snapshot_request);

    let round = warp::path!("battles" / Uuid / "rounds" / u32)
        .and(warp::get())
        .and(warp::header::optional::<String>("authorization"))
        .and(battle_service_filter.clone())
        .and(auth_filter.clone())
        .and_then(handle_round_request);

    let rematch = warp::path!("battles" / Uuid / "rematch")
        .and(warp::get())
        .and(battle_service_filter.clone())
        .and_then(handle_rematch_request);

    let moderation = warp::path!("admin" / "battles" / Uuid / "moderation")
        .and(warp::post())
        .and(warp::header::optional::<String>("x-admin-token"))
        .and(warp::body::json::<ModerationUpdate>())
        .and(battle_service_filter.clone())
        .and_then(handle_moderation_request);

    let cors = warp::cors()
        .allow_any_origin()
        .allow_headers(vec!["content-type", "authorization", "x-admin-token"])
        .allow_methods(vec!["GET", "POST"]);

    websocket
        .or(health)
        .or(completed)
        .or(snapshot)
        .or(round)
        .or(rematch)
        .or(moderation)
        .with(cors)
        .with(warp::log("word_duel"))
}

fn error_status(error: &BattleError) -> StatusCode {
    match error {
        BattleError::BattleNotFound { .. } | BattleError::RematchNotFound => StatusCode::NOT_FOUND,
        BattleError::NotAParticipant | BattleError::NotRematchRecipient => StatusCode::FORBIDDEN,
        BattleError::Unauthorized => StatusCode::UNAUTHORIZED,
        BattleError::InvalidMaxWords { .. }
        | BattleError::RoundMismatch { .. }
        | BattleError::EmptyGuess => StatusCode::BAD_REQUEST,
        BattleError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::CONFLICT,
    }
}

fn error_reply(error: &BattleError) -> Response {
    warp::reply::with_status(
        warp::reply::json(&serde_json::json!({
            "error": error,
            "message": error.to_string(),
        })),
        error_status(error),
    )
    .into_response()
}

fn json_reply<T: Serialize>(result: Result<T, BattleError>) -> Response {
    match result {
        Ok(value) => warp::reply::json(&value).into_response(),
        Err(error) => error_reply(&error),
    }
}

/// Anonymous callers are spectators; a bad token is an error rather than a
/// silent downgrade.
fn viewer_from_header(
    auth_header: Option<String>,
    auth_service: &AuthService,
) -> Result<Option<PlayerIdentity>, Response> {
    let Some(auth_header) = auth_header else {
        return Ok(None);
    };
    let token = auth_header
        .strip_prefix("Bearer ")
        .unwrap_or(&auth_header);

    auth_service.validate_token(token).map(Some).map_err(|e| {
        tracing::warn!("Rejected viewer token: {}", e);
        let status = match e {
            AuthError::SigningFailed => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        };
        warp::reply::with_status(
            warp::reply::json(&serde_json::json!({ "error": e.to_string() })),
            status,
        )
        .into_response()
    })
}

async fn handle_snapshot_request(
    battle_id: Uuid,
    auth_header: Option<String>,
    battle_service: Arc<BattleService>,
    auth_service: Arc<AuthService>,
) -> Result<Response, warp::Rejection> {
    let viewer = match viewer_from_header(auth_header, &auth_service) {
        Ok(viewer) => viewer,
        Err(response) => return Ok(response),
    };
    Ok(json_reply(
        battle_service.get_snapshot(viewer.as_ref(), battle_id).await,
    ))
}

async fn handle_round_request(
    battle_id: Uuid,
    round_index: u32,
    auth_header: Option<String>,
    battle_service: Arc<BattleService>,
    auth_service: Arc<AuthService>,
) -> Result<Response, warp::Rejection> {
    let viewer = match viewer_from_header(auth_header, &auth_service) {
        Ok(viewer) => viewer,
        Err(response) => return Ok(response),
    };
    Ok(json_reply(
        battle_service
            .get_round_detail(viewer.as_ref(), battle_id, round_index)
            .await,
    ))
}

async fn handle_rematch_request(
    battle_id: Uuid,
    battle_service: Arc<BattleService>,
) -> Result<Response, warp::Rejection> {
    let result = battle_service
        .get_rematch_status(battle_id)
        .await
        .and_then(|request| request.ok_or(BattleError::RematchNotFound));
    Ok(json_reply(result))
}

async fn handle_completed_request(
    query: CompletedQuery,
    battle_service: Arc<BattleService>,
) -> Result<Response, warp::Rejection> {
    Ok(json_reply(
        battle_service
            .list_completed_battles(query.since, query.limit)
            .await,
    ))
}

async fn handle_moderation_request(
    battle_id: Uuid,
    admin_token: Option<String>,
    update: ModerationUpdate,
    battle_service: Arc<BattleService>,
) -> Result<Response, warp::Rejection> {
    Ok(json_reply(
        battle_service
            .moderate_battle(admin_token.as_deref(), battle_id, &update)
            .await,
    ))
}
