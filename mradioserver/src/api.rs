//! Routes HTTP de la station
//!
//! Toutes les réponses JSON ont la forme `{"success": true, "data": …}` ou
//! `{"success": false, "message": …}`. Une opération refusée par l'état du
//! lecteur (transition en cours, file vide…) répond 409.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{delete, get, post},
    Json, Router,
};
use mradioplayer::{Packet, PlaybackError, Station};
use mradiosource::{SongRequest, SourceType};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};
use utoipa::OpenApi;

pub type AppState = Arc<Station>;

fn success<T: Serialize>(data: T) -> Response {
    (StatusCode::OK, Json(json!({ "success": true, "data": data }))).into_response()
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({ "success": false, "message": message.into() })),
    )
        .into_response()
}

fn playback_failure(error: PlaybackError) -> Response {
    let status = match &error {
        PlaybackError::InvalidPosition(_) => StatusCode::BAD_REQUEST,
        PlaybackError::PreviousEvicted(_) => StatusCode::NOT_FOUND,
        e if e.is_rejection() => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        warn!("Playback operation failed: {}", error);
    } else {
        debug!("Playback operation rejected: {}", error);
    }
    failure(status, error.to_string())
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct SeekRequest {
    /// Décalage relatif en secondes (négatif pour reculer)
    pub seconds: f64,
}

/// Lot de demandes, typiquement une playlist déjà développée
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct BatchRequest {
    pub requests: Vec<SongRequest>,
}

fn check_title(request: &SongRequest) -> Result<(), Response> {
    if request.title.trim().is_empty() {
        return Err(failure(StatusCode::BAD_REQUEST, "title must not be empty"));
    }
    Ok(())
}

fn check_batch(batch: &BatchRequest) -> Result<(), Response> {
    if batch.requests.is_empty() {
        return Err(failure(StatusCode::BAD_REQUEST, "requests must not be empty"));
    }
    batch.requests.iter().try_for_each(check_title)
}

/// Flux audio continu
#[utoipa::path(
    get,
    path = "/stream",
    responses((status = 200, description = "Live MP3 stream")),
    tag = "radio"
)]
pub async fn stream(State(station): State<AppState>) -> Response {
    let sink = station.broadcaster().add_sink();
    info!(sink = %sink.id(), "🎧 Listener connected ({} total)", station.broadcaster().sink_count());

    let audio = sink.filter_map(|packet| match packet {
        Packet::Audio(chunk) => Some(Ok::<_, Infallible>(chunk)),
        Packet::Metadata { .. } => None,
    });

    (
        [
            (header::CONTENT_TYPE, "audio/mpeg"),
            (header::CACHE_CONTROL, "no-cache, no-store"),
        ],
        Body::from_stream(audio),
    )
        .into_response()
}

/// Événements de la station en Server-Sent Events
#[utoipa::path(
    get,
    path = "/events",
    responses((status = 200, description = "Event stream")),
    tag = "radio"
)]
pub async fn events(State(station): State<AppState>) -> impl IntoResponse {
    let mut rx = station.events().subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(envelope) => {
                    match Event::default().event(envelope.event.kind()).json_data(&envelope) {
                        Ok(event) => yield Ok::<_, axum::Error>(event),
                        Err(e) => warn!("Cannot serialize event: {}", e),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!("SSE client lagging, {} events skipped", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[utoipa::path(get, path = "/api/now-playing", responses((status = 200, description = "Now playing snapshot")), tag = "radio")]
pub async fn now_playing(State(station): State<AppState>) -> Response {
    success(station.engine().snapshot())
}

#[utoipa::path(get, path = "/api/queue", responses((status = 200, description = "Whole playback queue, current track first")), tag = "radio")]
pub async fn queue(State(station): State<AppState>) -> Response {
    success(station.queue().snapshot())
}

#[utoipa::path(get, path = "/api/upcoming", responses((status = 200, description = "Queue without the current track")), tag = "radio")]
pub async fn upcoming(State(station): State<AppState>) -> Response {
    success(station.engine().upcoming())
}

#[utoipa::path(get, path = "/api/relay", responses((status = 200, description = "Relay status"), (status = 404, description = "No relay configured")), tag = "radio")]
pub async fn relay_status(State(station): State<AppState>) -> Response {
    match station.relay() {
        Some(relay) => success(relay.status()),
        None => failure(StatusCode::NOT_FOUND, "Relay is not configured"),
    }
}

#[utoipa::path(post, path = "/api/skip", responses((status = 200, description = "Skipped"), (status = 409, description = "Rejected")), tag = "control")]
pub async fn skip(State(station): State<AppState>) -> Response {
    match station.engine().skip().await {
        Ok(()) => success(station.engine().current()),
        Err(e) => playback_failure(e),
    }
}

#[utoipa::path(post, path = "/api/previous", responses((status = 200, description = "Previous track replayed"), (status = 404, description = "Previous track evicted"), (status = 409, description = "Rejected")), tag = "control")]
pub async fn previous(State(station): State<AppState>) -> Response {
    match station.engine().previous().await {
        Ok(track) => success(track),
        Err(e) => playback_failure(e),
    }
}

#[utoipa::path(post, path = "/api/pause", responses((status = 200, description = "Paused, data is the position in seconds"), (status = 409, description = "Rejected")), tag = "control")]
pub async fn pause(State(station): State<AppState>) -> Response {
    match station.engine().pause().await {
        Ok(position) => success(position),
        Err(e) => playback_failure(e),
    }
}

#[utoipa::path(post, path = "/api/resume", responses((status = 200, description = "Resumed"), (status = 409, description = "Rejected")), tag = "control")]
pub async fn resume(State(station): State<AppState>) -> Response {
    match station.engine().resume().await {
        Ok(()) => success(station.engine().snapshot()),
        Err(e) => playback_failure(e),
    }
}

#[utoipa::path(post, path = "/api/seek", request_body = SeekRequest, responses((status = 200, description = "Seek outcome"), (status = 409, description = "Rejected")), tag = "control")]
pub async fn seek(State(station): State<AppState>, Json(request): Json<SeekRequest>) -> Response {
    if !request.seconds.is_finite() {
        return failure(StatusCode::BAD_REQUEST, "seconds must be a finite number");
    }
    match station.engine().seek(request.seconds).await {
        Ok(outcome) => success(outcome),
        Err(e) => playback_failure(e),
    }
}

#[utoipa::path(get, path = "/api/requests", responses((status = 200, description = "Pending song requests")), tag = "requests")]
pub async fn list_requests(State(station): State<AppState>) -> Response {
    success(station.requests())
}

/// Sans `sourceType`, `reference` est une recherche libre soumise à tous
/// les résolveurs
#[utoipa::path(post, path = "/api/requests", request_body = SongRequest, responses((status = 200, description = "Request queued"), (status = 400, description = "Empty title")), tag = "requests")]
pub async fn add_request(
    State(station): State<AppState>,
    Json(request): Json<SongRequest>,
) -> Response {
    if let Err(rejected) = check_title(&request) {
        return rejected;
    }
    match station.add_request(request) {
        Ok(()) => success(station.requests().len()),
        Err(e) => playback_failure(e),
    }
}

#[utoipa::path(post, path = "/api/requests/top", request_body = SongRequest, responses((status = 200, description = "Request queued first"), (status = 400, description = "Empty title")), tag = "requests")]
pub async fn add_request_to_top(
    State(station): State<AppState>,
    Json(request): Json<SongRequest>,
) -> Response {
    if let Err(rejected) = check_title(&request) {
        return rejected;
    }
    match station.add_request_to_front(request) {
        Ok(()) => success(station.requests().len()),
        Err(e) => playback_failure(e),
    }
}

#[utoipa::path(post, path = "/api/requests/batch", request_body = BatchRequest, responses((status = 200, description = "Requests queued, data is the number added"), (status = 400, description = "Empty batch or title")), tag = "requests")]
pub async fn add_requests(
    State(station): State<AppState>,
    Json(batch): Json<BatchRequest>,
) -> Response {
    if let Err(rejected) = check_batch(&batch) {
        return rejected;
    }
    match station.add_requests(batch.requests) {
        Ok(added) => success(added),
        Err(e) => playback_failure(e),
    }
}

#[utoipa::path(post, path = "/api/requests/batch/top", request_body = BatchRequest, responses((status = 200, description = "Requests queued first, data is the number added"), (status = 400, description = "Empty batch or title")), tag = "requests")]
pub async fn add_requests_to_top(
    State(station): State<AppState>,
    Json(batch): Json<BatchRequest>,
) -> Response {
    if let Err(rejected) = check_batch(&batch) {
        return rejected;
    }
    match station.add_requests_to_front(batch.requests) {
        Ok(added) => success(added),
        Err(e) => playback_failure(e),
    }
}

#[utoipa::path(
    delete,
    path = "/api/requests/last/{requested_by}",
    params(("requested_by" = String, Path, description = "Requester name")),
    responses((status = 200, description = "Withdrawn request"), (status = 404, description = "No pending request from this user")),
    tag = "requests"
)]
pub async fn remove_last_request(
    State(station): State<AppState>,
    Path(requested_by): Path<String>,
) -> Response {
    match station.remove_last_request_by(&requested_by) {
        Ok(Some(request)) => success(request),
        Ok(None) => failure(
            StatusCode::NOT_FOUND,
            format!("No pending request from {}", requested_by),
        ),
        Err(e) => playback_failure(e),
    }
}

#[utoipa::path(
    delete,
    path = "/api/queue/{position}",
    params(("position" = usize, Path, description = "Queue position, 0 is the current track")),
    responses((status = 200, description = "Removed track"), (status = 400, description = "Invalid position")),
    tag = "requests"
)]
pub async fn remove_from_queue(
    State(station): State<AppState>,
    Path(position): Path<usize>,
) -> Response {
    match station.engine().remove_at(position) {
        Ok(track) => success(track),
        Err(e) => playback_failure(e),
    }
}

/// Router complet de la station (chemins absolus)
pub fn create_router(station: AppState) -> Router {
    Router::new()
        .route("/stream", get(stream))
        .route("/events", get(events))
        .route("/api/now-playing", get(now_playing))
        .route("/api/queue", get(queue))
        .route("/api/queue/{position}", delete(remove_from_queue))
        .route("/api/upcoming", get(upcoming))
        .route("/api/relay", get(relay_status))
        .route("/api/skip", post(skip))
        .route("/api/previous", post(previous))
        .route("/api/pause", post(pause))
        .route("/api/resume", post(resume))
        .route("/api/seek", post(seek))
        .route("/api/requests", get(list_requests).post(add_request))
        .route("/api/requests/top", post(add_request_to_top))
        .route("/api/requests/batch", post(add_requests))
        .route("/api/requests/batch/top", post(add_requests_to_top))
        .route("/api/requests/last/{requested_by}", delete(remove_last_request))
        .with_state(station)
}

#[derive(utoipa::OpenApi)]
#[openapi(
    paths(
        stream,
        events,
        now_playing,
        queue,
        upcoming,
        relay_status,
        skip,
        previous,
        pause,
        resume,
        seek,
        list_requests,
        add_request,
        add_request_to_top,
        add_requests,
        add_requests_to_top,
        remove_last_request,
        remove_from_queue,
    ),
    components(schemas(SeekRequest, BatchRequest, SongRequest, SourceType)),
    tags(
        (name = "radio", description = "Live stream and station state"),
        (name = "control", description = "Playback control"),
        (name = "requests", description = "Song requests and queue administration")
    )
)]
pub struct ApiDoc;

/// Spécification complète : routes de la station et réglage des logs
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.merge(crate::logs::LogsApiDoc::openapi());
    doc
}
