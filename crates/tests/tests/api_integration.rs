use std::path::PathBuf;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use midc_api::build_app;
use serde_json::json;
use tower::ServiceExt;

fn data_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../data/rates.sample.json")
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let app = build_app(data_path()).await.expect("app should build");

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = body_json(response).await;
    assert!(parsed["dataset"]["records_loaded"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn chat_requires_api_key() {
    let app = build_app(data_path()).await.expect("app should build");

    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "text": "hinjewadi" }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn chat_flow_walks_all_three_states() {
    let app = build_app(data_path()).await.expect("app should build");

    let first = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/chat")
                .header("content-type", "application/json")
                .header("x-api-key", "dev-midc-key")
                .body(Body::from(json!({ "text": "Hinjewadi" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    let first = body_json(first).await;
    assert_eq!(first["state"], "awaiting_rate_type");
    let session_id = first["session_id"].as_str().unwrap().to_string();

    let second = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/chat")
                .header("content-type", "application/json")
                .header("x-api-key", "dev-midc-key")
                .body(Body::from(
                    json!({ "session_id": session_id, "text": "industrial please" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    let second = body_json(second).await;
    assert_eq!(second["state"], "done");
    assert!(second["reply_text"].as_str().unwrap().contains("5000"));

    let third = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/chat")
                .header("content-type", "application/json")
                .header("x-api-key", "dev-midc-key")
                .body(Body::from(
                    json!({ "session_id": session_id, "text": "ok" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    let third = body_json(third).await;
    assert_eq!(third["state"], "awaiting_location");
}

#[tokio::test]
async fn reset_clears_session_state() {
    let app = build_app(data_path()).await.expect("app should build");

    let first = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/chat")
                .header("content-type", "application/json")
                .header("x-api-key", "dev-midc-key")
                .body(Body::from(json!({ "text": "taloja" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let first = body_json(first).await;
    let session_id = first["session_id"].as_str().unwrap().to_string();
    assert_eq!(first["state"], "awaiting_rate_type");

    let reset = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/reset")
                .header("content-type", "application/json")
                .header("x-api-key", "dev-midc-key")
                .body(Body::from(json!({ "session_id": session_id }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(reset.status(), StatusCode::OK);
    let reset = body_json(reset).await;
    assert_eq!(reset["state"], "awaiting_location");
    assert!(reset["resolved"].is_null());
}

#[tokio::test]
async fn direct_rate_lookup_and_invalid_rate_type() {
    let app = build_app(data_path()).await.expect("app should build");

    let hit = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/rate")
                .header("content-type", "application/json")
                .header("x-api-key", "dev-midc-key")
                .body(Body::from(
                    json!({
                        "district": "Pune",
                        "taluka": "Haveli",
                        "location": "Hinjewadi",
                        "rate_type": "industrial"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(hit.status(), StatusCode::OK);
    let hit = body_json(hit).await;
    assert_eq!(hit["available"], true);
    assert_eq!(hit["rate"], 5000.0);

    let miss = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/rate")
                .header("content-type", "application/json")
                .header("x-api-key", "dev-midc-key")
                .body(Body::from(
                    json!({
                        "district": "Pune",
                        "taluka": "Haveli",
                        "location": "Hinjewadi",
                        "rate_type": "residential"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    let miss = body_json(miss).await;
    assert_eq!(miss["available"], false);
    assert!(miss["rate"].is_null());

    let bad = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/rate")
                .header("content-type", "application/json")
                .header("x-api-key", "dev-midc-key")
                .body(Body::from(
                    json!({
                        "district": "Pune",
                        "taluka": "Haveli",
                        "location": "Hinjewadi",
                        "rate_type": "agricultural"
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn browse_endpoints_list_the_dataset() {
    let app = build_app(data_path()).await.expect("app should build");

    let districts = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/districts")
                .header("x-api-key", "dev-midc-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(districts.status(), StatusCode::OK);
    let districts = body_json(districts).await;
    let names = districts["districts"].as_array().unwrap();
    assert!(names.contains(&json!("Pune")));
    assert!(names.contains(&json!("Raigad")));

    let talukas = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/districts/Pune/talukas")
                .header("x-api-key", "dev-midc-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let talukas = body_json(talukas).await;
    assert_eq!(talukas["talukas"], json!(["Haveli", "Mulshi"]));

    let locations = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v1/locations?district=Pune&taluka=Haveli")
                .header("x-api-key", "dev-midc-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let locations = body_json(locations).await;
    assert_eq!(locations["locations"], json!(["Chakan", "Hinjewadi", "Talawade"]));

    let rate_types = app
        .oneshot(
            Request::builder()
                .uri("/v1/rate_types")
                .header("x-api-key", "dev-midc-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let rate_types = body_json(rate_types).await;
    assert_eq!(rate_types["rate_types"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn resolver_endpoint_reports_misses_without_error() {
    let app = build_app(data_path()).await.expect("app should build");

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/resolve")
                .header("content-type", "application/json")
                .header("x-api-key", "dev-midc-key")
                .body(Body::from(json!({ "text": "atlantis" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let parsed = body_json(response).await;
    assert!(parsed["resolved"].is_null());
}
