//! Router tests against mock devices.

use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use kiosk_core::Identification;
use kiosk_protocol::CommandCode;
use kiosk_server::{AppState, build_router};
use kiosk_terminal::{MockDevices, StaticSettings, Terminal, TerminalSettings, TerminalState};
use serde_json::{Value, json};
use tower::ServiceExt;

fn settings() -> TerminalSettings {
    TerminalSettings {
        rfid_read_timeout: Duration::from_millis(50),
        rfid_initial_window: Duration::from_millis(20),
        rfid_idle_gap: Duration::from_millis(10),
        confirm_timeout: Duration::from_secs(30),
        dispense_retract_delay: Duration::from_millis(50),
        ..TerminalSettings::default()
    }
}

fn app_with(settings: TerminalSettings) -> (Router, Terminal, MockDevices) {
    let devices = MockDevices::new();
    devices.crt().ack_all();
    let terminal = Terminal::new(StaticSettings(settings), devices.clone());
    let router = build_router(AppState::new(terminal.clone()));
    (router, terminal, devices)
}

fn app() -> (Router, Terminal, MockDevices) {
    app_with(settings())
}

async fn send(router: &Router, method: Method, uri: &str, body: Body) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(body)
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn issue(router: &Router) -> (StatusCode, Value) {
    send(router, Method::POST, "/issue-card", Body::empty()).await
}

async fn confirm(router: &Router, operation_id: &str, allow: bool) -> (StatusCode, Value) {
    let body = json!({ "operationId": operation_id, "allow": allow }).to_string();
    send(router, Method::POST, "/confirm", Body::from(body)).await
}

async fn staged_operation(router: &Router, devices: &MockDevices) -> String {
    devices
        .identifier()
        .push_identified(Identification::token("045678"));
    let (status, body) = issue(router).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["operationId"].as_str().unwrap().to_string()
}

async fn wait_for_idle(terminal: &Terminal) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while terminal.state() != TerminalState::Idle {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("terminal did not return to idle");
}

#[tokio::test]
async fn test_issue_card_success_body() {
    let (router, _terminal, devices) = app();
    devices
        .identifier()
        .push_identified(Identification::token("045678"));

    let (status, body) = issue(&router).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["uid"], json!("045678"));
    assert_eq!(body["timeoutSec"], json!(30));
    assert_eq!(body["attempts"], json!(1));
    assert!(body["operationId"].is_string());
    assert!(body["elapsedMilliseconds"].is_u64());
}

#[tokio::test]
async fn test_issue_card_hex_uid_body() {
    let (router, _terminal, devices) = app();
    devices.identifier().push_identified(
        Identification::hex_uid("AB123456")
            .with_wiegand(86, 9320)
            .with_reader("ACS ACR122U"),
    );

    let (status, body) = issue(&router).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["uidHex"], json!("AB123456"));
    assert_eq!(body["facility"], json!(86));
    assert_eq!(body["card"], json!(9320));
    assert_eq!(body["reader"], json!("ACS ACR122U"));
    assert!(body.get("uid").is_none());
}

#[tokio::test]
async fn test_issue_card_not_identified_is_200() {
    let (router, terminal, devices) = app();
    devices.identifier().push_nothing();

    let (status, body) = issue(&router).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"], json!("UID not received after retries"));
    assert_eq!(body["attempts"], json!(1));
    assert!(body["elapsedMilliseconds"].is_u64());
    assert_eq!(terminal.state(), TerminalState::Idle);
    assert_eq!(devices.crt().count(CommandCode::Retract), 1);
}

#[tokio::test]
async fn test_issue_card_conflict_names_pending_operation() {
    let (router, _terminal, devices) = app();
    let operation_id = staged_operation(&router, &devices).await;

    let (status, body) = issue(&router).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["operationId"], json!(operation_id));
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_issue_card_conflict_while_staging_has_null_operation_id() {
    let (router, terminal, devices) = app_with(TerminalSettings {
        rfid_read_timeout: Duration::from_secs(2),
        ..settings()
    });
    devices.identifier().push_delayed(
        Identification::token("045678"),
        Duration::from_millis(300),
    );

    let first = tokio::spawn({
        let router = router.clone();
        async move { issue(&router).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(terminal.state(), TerminalState::Staging);

    let (status, body) = issue(&router).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.get("operationId").is_some());
    assert_eq!(body["operationId"], Value::Null);

    let (status, _) = first.await.unwrap();
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_issue_card_transport_failure_is_500() {
    let (router, terminal, devices) = app();
    devices.crt().fail_open(true);

    let (status, body) = issue(&router).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], json!(false));
    assert!(body["error"].is_string());
    assert!(body["elapsedMilliseconds"].is_u64());
    assert_eq!(terminal.state(), TerminalState::Idle);
}

#[tokio::test]
async fn test_confirm_allow_dispenses() {
    let (router, terminal, devices) = app();
    let operation_id = staged_operation(&router, &devices).await;

    let (status, body) = confirm(&router, &operation_id, true).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({ "success": true, "action": "dispensed", "uid": "045678" })
    );
    assert_eq!(devices.crt().count(CommandCode::Dispense), 1);

    wait_for_idle(&terminal).await;
    assert_eq!(devices.crt().count(CommandCode::Retract), 1);
}

#[tokio::test]
async fn test_confirm_deny_returns() {
    let (router, terminal, devices) = app();
    let operation_id = staged_operation(&router, &devices).await;

    let (status, body) = confirm(&router, &operation_id.to_uppercase(), false).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["action"], json!("returned"));
    assert_eq!(devices.crt().count(CommandCode::Dispense), 0);
    assert_eq!(devices.crt().count(CommandCode::Retract), 1);
    assert_eq!(terminal.state(), TerminalState::Idle);
}

#[tokio::test]
async fn test_confirm_without_pending_is_410() {
    let (router, _terminal, devices) = app();

    let (status, body) = confirm(&router, "8d6e3c8a-0b7e-4a57-9a43-2f6a3d3c1b10", true).await;

    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["success"], json!(false));
    assert!(devices.crt().written().is_empty());
}

#[tokio::test]
async fn test_confirm_stale_id_is_410() {
    let (router, _terminal, devices) = app();
    let operation_id = staged_operation(&router, &devices).await;
    let (status, _) = confirm(&router, &operation_id, false).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = confirm(&router, &operation_id, false).await;

    assert_eq!(status, StatusCode::GONE);
    assert_eq!(devices.crt().count(CommandCode::Retract), 1);
}

#[tokio::test]
async fn test_confirm_mismatch_is_409() {
    let (router, terminal, devices) = app();
    let operation_id = staged_operation(&router, &devices).await;
    devices.crt().clear_written();

    let (status, _) = confirm(&router, "8d6e3c8a-0b7e-4a57-9a43-2f6a3d3c1b10", true).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(devices.crt().written().is_empty());
    assert_eq!(terminal.state(), TerminalState::AwaitingConfirmation);

    let (status, _) = confirm(&router, &operation_id, false).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_confirm_transport_failure_is_500() {
    let (router, terminal, devices) = app();
    let operation_id = staged_operation(&router, &devices).await;
    devices.crt().fail_writes(true);

    let (status, body) = confirm(&router, &operation_id, true).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], json!(false));
    wait_for_idle(&terminal).await;
}

#[tokio::test]
async fn test_confirm_malformed_body_is_400() {
    let (router, _terminal, devices) = app();

    for body in [
        "",
        "not json",
        r#"{"allow":true}"#,
        r#"{"operationId":"x"}"#,
        r#"{"operationId":"x","allow":"yes"}"#,
    ] {
        let (status, value) = send(&router, Method::POST, "/confirm", Body::from(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {body:?}");
        assert!(value["error"].is_string());
    }
    assert!(devices.crt().written().is_empty());
}

#[tokio::test]
async fn test_card_status_get_and_post() {
    let (router, _terminal, devices) = app();
    devices
        .crt()
        .respond(&[0x05], &[0x02, b'S', b'F', 0x30, 0x30, 0x30, 0x38, 0x03, 0x00]);

    for method in [Method::GET, Method::POST] {
        let (status, body) = send(&router, method, "/card-status", Body::empty()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "status": 0 }));
    }
}

#[tokio::test]
async fn test_card_status_failure_is_500() {
    let devices = MockDevices::new();
    let terminal = Terminal::new(StaticSettings(settings()), devices.clone());
    let router = build_router(AppState::new(terminal));

    let (status, body) = send(&router, Method::GET, "/card-status", Body::empty()).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["status"], json!(-1));
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_trailing_slash_variants() {
    let (router, _terminal, devices) = app();
    devices
        .crt()
        .respond(&[0x05], &[0x02, b'S', b'F', 0x30, 0x30, 0x30, 0x30, 0x03, 0x00]);
    devices.identifier().push_nothing();

    let (status, body) = send(&router, Method::POST, "/issue-card/", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(false));

    let (status, _) = send(&router, Method::POST, "/confirm/", Body::from("{}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&router, Method::GET, "/card-status/", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": 2 }));
}

#[tokio::test]
async fn test_cors_headers_on_every_response() {
    let (router, _terminal, _devices) = app();

    for (method, uri) in [
        (Method::POST, "/confirm"),
        (Method::GET, "/issue-card"),
        (Method::GET, "/missing"),
    ] {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "*");
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_METHODS],
            "GET, POST, OPTIONS"
        );
    }
}

#[tokio::test]
async fn test_options_preflight_on_any_path() {
    let (router, _terminal, devices) = app();

    for uri in ["/issue-card", "/confirm/", "/anything"] {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }
    assert_eq!(devices.crt().opens(), 0);
}

#[tokio::test]
async fn test_other_methods_are_405() {
    let (router, _terminal, devices) = app();

    for (method, uri) in [
        (Method::GET, "/issue-card"),
        (Method::PUT, "/confirm"),
        (Method::DELETE, "/card-status"),
    ] {
        let (status, _) = send(&router, method, uri, Body::empty()).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED, "{uri}");
    }
    assert_eq!(devices.crt().opens(), 0);
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let (router, _terminal, _devices) = app();

    let (status, body) = send(&router, Method::POST, "/eject", Body::empty()).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());
}
