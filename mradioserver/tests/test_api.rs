use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use mradiocache::CacheManager;
use mradioplayer::{AudioStream, PlaybackError, Station, StationBuilder, TranscodeRequest, Transcoder};
use mradiosource::{
    BitrateProbe, Error, MemoryStore, SongRequest, SourceType, Track, TrackSource,
};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

#[derive(Debug)]
struct SilentTranscoder;

#[async_trait]
impl Transcoder for SilentTranscoder {
    async fn start(&self, _request: &TranscodeRequest) -> Result<AudioStream, PlaybackError> {
        Ok(Box::pin(futures::stream::pending::<std::io::Result<axum::body::Bytes>>()))
    }
}

struct EmptySource;

#[async_trait]
impl TrackSource for EmptySource {
    async fn next_track(&self) -> mradiosource::Result<Track> {
        Err(Error::RetriesExhausted(3))
    }
}

#[derive(Debug)]
struct FixedProbe;

#[async_trait]
impl BitrateProbe for FixedProbe {
    async fn bitrate(&self, _location: &str) -> u32 {
        128_000
    }
}

fn track(title: &str) -> Track {
    Track {
        title: title.to_string(),
        media_location: format!("/music/{}.mp3", title),
        source_type: SourceType::Local,
        duration_seconds: 120.0,
        requested_by: "tester".to_string(),
        bitrate: 128_000,
    }
}

fn station(dir: &TempDir) -> Arc<Station> {
    let cache = Arc::new(
        CacheManager::new(dir.path().join("cache"), dir.path().join("tracks"), 1 << 30).unwrap(),
    );
    Arc::new(
        StationBuilder::new(
            cache,
            Arc::new(EmptySource),
            Arc::new(MemoryStore::<SongRequest>::new()),
        )
        .probe(Arc::new(FixedProbe))
        .transcoder(Arc::new(SilentTranscoder))
        .min_queue_size(1)
        .build(),
    )
}

async fn call(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => request
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_now_playing_when_idle() {
    let dir = TempDir::new().unwrap();
    let router = mradioserver::api::create_router(station(&dir));

    let (status, body) = call(&router, "GET", "/api/now-playing", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "idle");
    assert!(body["data"]["current"].is_null());
}

#[tokio::test]
async fn test_rejected_controls_return_conflict() {
    let dir = TempDir::new().unwrap();
    let router = mradioserver::api::create_router(station(&dir));

    for uri in ["/api/skip", "/api/pause", "/api/resume", "/api/previous"] {
        let (status, body) = call(&router, "POST", uri, None).await;
        assert_eq!(status, StatusCode::CONFLICT, "{}", uri);
        assert_eq!(body["success"], false);
        assert!(body["message"].is_string());
    }

    let (status, _) = call(&router, "POST", "/api/seek", Some(serde_json::json!({"seconds": 10.0}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_requests_round_trip() {
    let dir = TempDir::new().unwrap();
    let router = mradioserver::api::create_router(station(&dir));

    let request = serde_json::json!({
        "title": "Blue in Green",
        "reference": "blue-in-green.mp3",
        "sourceType": "local"
    });
    let (status, body) = call(&router, "POST", "/api/requests", Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], 1);

    let urgent = serde_json::json!({
        "title": "So What",
        "reference": "so-what.mp3",
        "sourceType": "local",
        "requestedBy": "miles"
    });
    let (status, _) = call(&router, "POST", "/api/requests/top", Some(urgent)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = call(&router, "GET", "/api/requests", None).await;
    let titles: Vec<_> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(titles, vec!["So What", "Blue in Green"]);
    assert_eq!(body["data"][1]["requestedBy"], "anonymous");
}

#[tokio::test]
async fn test_free_text_batches_and_withdrawal() {
    let dir = TempDir::new().unwrap();
    let router = mradioserver::api::create_router(station(&dir));

    let free_text = serde_json::json!({"title": "Tum Hi Ho", "reference": "Tum Hi Ho", "requestedBy": "asha"});
    let (status, _) = call(&router, "POST", "/api/requests", Some(free_text)).await;
    assert_eq!(status, StatusCode::OK);

    let playlist = serde_json::json!({"requests": [
        {"title": "Kun Faya Kun", "reference": "Kun Faya Kun", "requestedBy": "ravi"},
        {"title": "Agar Tum Saath Ho", "reference": "Agar Tum Saath Ho", "requestedBy": "asha"}
    ]});
    let (status, body) = call(&router, "POST", "/api/requests/batch", Some(playlist)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], 2);

    let first = serde_json::json!({"requests": [
        {"title": "Intro", "reference": "intro.mp3", "sourceType": "local"}
    ]});
    let (status, _) = call(&router, "POST", "/api/requests/batch/top", Some(first)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&router, "POST", "/api/requests/batch", Some(serde_json::json!({"requests": []}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let blank = serde_json::json!({"requests": [{"title": " ", "reference": "x"}]});
    let (status, _) = call(&router, "POST", "/api/requests/batch", Some(blank)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&router, "DELETE", "/api/requests/last/asha", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "Agar Tum Saath Ho");
    let (status, body) = call(&router, "DELETE", "/api/requests/last/nobody", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);

    let (_, body) = call(&router, "GET", "/api/requests", None).await;
    let titles: Vec<_> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(titles, vec!["Intro", "Tum Hi Ho", "Kun Faya Kun"]);
    assert!(body["data"][1].get("sourceType").is_none());
}

#[test]
fn test_openapi_documents_request_bodies() {
    let doc = serde_json::to_value(mradioserver::api::openapi()).unwrap();
    assert!(doc["paths"]["/api/requests/batch"]["post"]["requestBody"].is_object());
    assert!(doc["paths"]["/api/requests/last/{requested_by}"]["delete"].is_object());
    assert!(doc["components"]["schemas"]["SongRequest"].is_object());
    assert!(doc["paths"]["/api/log_setup"]["post"].is_object());
}

#[tokio::test]
async fn test_queue_administration_routes() {
    let dir = TempDir::new().unwrap();
    let station = station(&dir);
    station.queue().push_back(track("A"));
    station.queue().push_back(track("B"));
    station.engine().play(true).await.unwrap();
    let router = mradioserver::api::create_router(station.clone());

    let (status, body) = call(&router, "GET", "/api/queue", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, body) = call(&router, "GET", "/api/upcoming", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["title"], "B");

    let (status, _) = call(&router, "DELETE", "/api/queue/0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(&router, "DELETE", "/api/queue/7", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = call(&router, "DELETE", "/api/queue/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["title"], "B");

    let (status, body) = call(&router, "POST", "/api/seek", Some(serde_json::json!({"seconds": 0.0}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "restarted");

    station.shutdown().await;
}

#[tokio::test]
async fn test_relay_status_without_relay() {
    let dir = TempDir::new().unwrap();
    let router = mradioserver::api::create_router(station(&dir));

    let (status, body) = call(&router, "GET", "/api/relay", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}
