//! API integration tests for tile retrieval and error handling.
//!
//! Tests verify:
//! - Tile and TileJSON responses
//! - Status codes for empty, missing and mismatched tiles
//! - Cache-Control, CORS and Vary headers
//! - HEAD requests

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use pmtiles_streamer::{create_router, RouterConfig, SharedPromiseCache, TileType};

use super::test_utils::{MockProvider, TestArchive};

fn world_archive() -> Vec<u8> {
    TestArchive::new()
        .zoom_range(0, 2)
        .metadata(r#"{"name":"World","attribution":"© Test","vector_layers":[{"id":"land"}]}"#)
        .tile(0, 0, 0, b"root tile")
        .tile(1, 0, 0, b"nw")
        .build()
}

fn test_router(config: RouterConfig) -> Router {
    let provider = MockProvider::new()
        .with_archive("world", world_archive())
        .with_archive(
            "imagery/satellite",
            TestArchive::new()
                .tile_type(TileType::Png)
                .tile(0, 0, 0, b"\x89PNG")
                .build(),
        )
        .with_archive("broken", vec![0u8; 256]);

    create_router(
        Arc::new(provider),
        Arc::new(SharedPromiseCache::default()),
        config,
    )
}

async fn send(router: Router, request: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let response = router.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

async fn get(uri: &str) -> (StatusCode, HeaderMap, Bytes) {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    send(test_router(RouterConfig::new()), request).await
}

// =============================================================================
// Tile Retrieval
// =============================================================================

#[tokio::test]
async fn test_tile_retrieval_success() {
    let (status, headers, body) = get("/world/0/0/0.mvt").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers.get("content-type").unwrap(),
        "application/x-protobuf"
    );
    assert_eq!(headers.get("cache-control").unwrap(), "max-age=86400");
    assert_eq!(headers.get("vary").unwrap(), "Origin");
    assert_eq!(&body[..], b"root tile");
}

#[tokio::test]
async fn test_pbf_extension_alias() {
    let (status, _, body) = get("/world/1/0/0.pbf").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&body[..], b"nw");
}

#[tokio::test]
async fn test_nested_archive_name() {
    let (status, headers, body) = get("/imagery/satellite/0/0/0.png").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("content-type").unwrap(), "image/png");
    assert_eq!(&body[..], b"\x89PNG");
}

#[tokio::test]
async fn test_empty_tile_is_no_content() {
    let (status, headers, body) = get("/world/1/1/1.mvt").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(headers.get("content-type").is_none());
    assert!(body.is_empty());
}

#[tokio::test]
async fn test_zoom_outside_archive_is_not_found() {
    let (status, headers, _) = get("/world/3/0/0.mvt").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(headers.contains_key("cache-control"));
}

#[tokio::test]
async fn test_extension_mismatch() {
    let (status, _, body) = get("/world/0/0/0.png").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        std::str::from_utf8(&body).unwrap(),
        "Bad request: requested .png but archive has type .mvt"
    );
}

#[tokio::test]
async fn test_coordinates_outside_zoom_level() {
    let (status, _, body) = get("/world/1/2/0.mvt").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["error"], "out_of_range");
}

// =============================================================================
// Error Handling
// =============================================================================

#[tokio::test]
async fn test_missing_archive() {
    let (status, _, body) = get("/nowhere/0/0/0.mvt").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["error"], "not_found");
}

#[tokio::test]
async fn test_invalid_paths() {
    for uri in ["/", "/world", "/world/0/0/0", "/world/a/0/0.mvt", "/world/0/0/0.MVT"] {
        let (status, _, body) = get(uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "uri {}", uri);
        assert_eq!(&body[..], b"Invalid URL", "uri {}", uri);
    }
}

#[tokio::test]
async fn test_broken_archive_is_server_error() {
    let (status, headers, body) = get("/broken/0/0/0.mvt").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(headers.get("cache-control").is_none());
    assert_eq!(headers.get("vary").unwrap(), "Origin");

    let error: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(error["error"], "invalid_archive");
    assert_eq!(error["status"], 500);
}

#[tokio::test]
async fn test_method_not_allowed() {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/world/0/0/0.mvt")
        .body(Body::empty())
        .unwrap();
    let (status, _, _) = send(test_router(RouterConfig::new()), request).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_head_request_has_empty_body() {
    let request = Request::builder()
        .method(Method::HEAD)
        .uri("/world/0/0/0.mvt")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(test_router(RouterConfig::new()), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers.get("content-type").unwrap(),
        "application/x-protobuf"
    );
    assert!(body.is_empty());
}

// =============================================================================
// TileJSON
// =============================================================================

#[tokio::test]
async fn test_tilejson_uses_request_host() {
    let request = Request::builder()
        .uri("/world.json")
        .header("host", "tiles.example.com")
        .body(Body::empty())
        .unwrap();
    let (status, headers, body) = send(test_router(RouterConfig::new()), request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("content-type").unwrap(), "application/json");

    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["tilejson"], "3.0.0");
    assert_eq!(json["scheme"], "xyz");
    assert_eq!(
        json["tiles"][0],
        "https://tiles.example.com/world/{z}/{x}/{y}.mvt"
    );
    assert_eq!(json["name"], "World");
    assert_eq!(json["attribution"], "© Test");
    assert_eq!(json["vector_layers"][0]["id"], "land");
    assert_eq!(json["minzoom"], 0);
    assert_eq!(json["maxzoom"], 2);
    assert_eq!(json["bounds"][0], -180.0);
    assert_eq!(json["bounds"][3], 85.0);
    assert!(json.get("description").is_none());
}

#[tokio::test]
async fn test_tilejson_public_hostname() {
    let config = RouterConfig::new().with_public_hostname(Some("cdn.example.org".to_string()));
    let request = Request::builder()
        .uri("/imagery/satellite.json")
        .header("host", "internal:8080")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(test_router(config), request).await;

    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(
        json["tiles"][0],
        "https://cdn.example.org/imagery/satellite/{z}/{x}/{y}.png"
    );
}

#[tokio::test]
async fn test_tilejson_missing_archive() {
    let (status, _, _) = get("/nowhere.json").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Headers
// =============================================================================

async fn origin_response(config: RouterConfig, origin: Option<&str>) -> HeaderMap {
    let mut builder = Request::builder().uri("/world/0/0/0.mvt");
    if let Some(origin) = origin {
        builder = builder.header("origin", origin);
    }
    let request = builder.body(Body::empty()).unwrap();
    let (_, headers, _) = send(test_router(config), request).await;
    headers
}

#[tokio::test]
async fn test_cors_allowed_origin() {
    let config = RouterConfig::new().with_allowed_origins(vec![
        "https://a.example".to_string(),
        "https://b.example".to_string(),
    ]);
    let headers = origin_response(config, Some("https://b.example")).await;
    assert_eq!(
        headers.get("access-control-allow-origin").unwrap(),
        "https://b.example"
    );
    assert_eq!(headers.get("vary").unwrap(), "Origin");
}

#[tokio::test]
async fn test_cors_disallowed_origin() {
    let config = RouterConfig::new().with_allowed_origins(vec!["https://a.example".to_string()]);
    let headers = origin_response(config, Some("https://evil.example")).await;
    assert!(headers.get("access-control-allow-origin").is_none());
    assert_eq!(headers.get("vary").unwrap(), "Origin");
}

#[tokio::test]
async fn test_cors_wildcard() {
    let config = RouterConfig::new().with_allowed_origins(vec!["*".to_string()]);
    let headers = origin_response(config, Some("https://anyone.example")).await;
    assert_eq!(headers.get("access-control-allow-origin").unwrap(), "*");
}

#[tokio::test]
async fn test_no_cors_by_default() {
    let headers = origin_response(RouterConfig::new(), Some("https://a.example")).await;
    assert!(headers.get("access-control-allow-origin").is_none());
}

#[tokio::test]
async fn test_custom_cache_max_age() {
    let headers = origin_response(RouterConfig::new().with_cache_max_age(60), None).await;
    assert_eq!(headers.get("cache-control").unwrap(), "max-age=60");
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_check() {
    let (status, _, body) = get("/health").await;
    assert_eq!(status, StatusCode::OK);

    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert!(json["version"].is_string());
}
