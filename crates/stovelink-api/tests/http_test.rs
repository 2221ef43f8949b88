//! Router tests driven through `tower::ServiceExt::oneshot`.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use stovelink_api::{router, Bridge};
use stovelink_core::{BridgeConfig, Engine, EventBroadcaster, SimulatedStove};
use tower::ServiceExt;

fn app_with(stove: SimulatedStove) -> Router {
    let engine = Engine::new(BridgeConfig::default(), stove, EventBroadcaster::new(), None);
    let (bridge, handle) = Bridge::new(engine);
    tokio::spawn(bridge.run());
    router(handle)
}

fn app() -> Router {
    app_with(SimulatedStove::new())
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, String, String) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v.to_str().unwrap().to_string())
        .unwrap_or_default();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, content_type, String::from_utf8(body.to_vec()).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/cgi-bin/sendmsg.lua")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn info(body: &str) -> Value {
    let doc: Value = serde_json::from_str(body).unwrap();
    doc["INFO"].clone()
}

#[tokio::test]
async fn test_get_command() {
    let (status, content_type, body) = send(app(), get("/cgi-bin/sendmsg.lua?cmd=GET+SETP")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(content_type, "text/json");
    assert_eq!(
        body,
        r#"{"INFO":{"CMD":"GET SETP","RSP":"OK"},"DATA":{"SETP":21.00},"SUCCESS":true}"#
    );
}

#[tokio::test]
async fn test_get_without_command_is_unknown() {
    let (status, _, body) = send(app(), get("/cgi-bin/sendmsg.lua")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info(&body)["CMD"], "UNKNOWN");
}

#[tokio::test]
async fn test_post_command() {
    let (status, _, body) = send(app(), post(r#"{"command":"SET POWR 4"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    let doc: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(doc["INFO"]["CMD"], "SET POWR 4");
    assert_eq!(doc["SUCCESS"], true);
    assert_eq!(doc["DATA"]["PWR"], 4);
}

#[tokio::test]
async fn test_post_malformed_body_is_unknown() {
    let (status, _, body) = send(app(), post("not json")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(info(&body)["CMD"], "UNKNOWN");
}

#[tokio::test]
async fn test_device_failure_still_200() {
    let mut stove = SimulatedStove::new();
    stove.set_offline(true);
    let (status, _, body) = send(app_with(stove), get("/cgi-bin/sendmsg.lua?cmd=GET%20STAT")).await;
    assert_eq!(status, StatusCode::OK);
    let doc: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(doc["SUCCESS"], false);
    assert_eq!(doc["INFO"]["RSP"], "TIMEOUT");
    assert_eq!(doc["DATA"]["NODATA"], true);
}

#[tokio::test]
async fn test_backup_download() {
    let response = app()
        .oneshot(get("/cgi-bin/sendmsg.lua?cmd=BKP+HPAR+CSV"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/csv");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"HPAR.csv\""
    );
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(body.starts_with(b"HPAR;VALUE\r\n0;0\r\n"));
}

#[tokio::test]
async fn test_backup_bad_file_type() {
    let (_, content_type, body) = send(app(), get("/cgi-bin/sendmsg.lua?cmd=BKP+PARM+XML")).await;
    assert_eq!(content_type, "text/json");
    let info = info(&body);
    assert_eq!(info["CMD"], "BKP PARM");
    assert_eq!(info["MSG"], "Incorrect File Type : XML");
}

#[tokio::test]
async fn test_backup_not_reachable_over_post() {
    let (_, _, body) = send(app(), post(r#"{"command":"BKP PARM CSV"}"#)).await;
    assert_eq!(info(&body)["CMD"], "UNKNOWN");
}

#[tokio::test]
async fn test_status() {
    let (status, _, body) = send(app(), get("/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"haprotocol":"Disabled"}"#);
}

#[tokio::test]
async fn test_event_stream_headers() {
    let response = app().oneshot(get("/events")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
}
