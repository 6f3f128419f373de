//! Configuration endpoints and route wiring

use axum::http::StatusCode;

use crate::test_harness::{PortalHarness, CALLBACK_PATH};

#[tokio::test]
async fn test_auth_config_is_public() {
    let harness = PortalHarness::new().await;

    let (status, body) = harness.send("GET", "/api/auth-config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["clientId"], "portal-client");
    assert_eq!(
        body["authority"].as_str().unwrap(),
        format!("{}/contoso", harness.identity.url())
    );
    assert_eq!(body["redirectUri"], "http://localhost:3000/auth/callback");
    assert!(body["loginScopes"]
        .as_array()
        .unwrap()
        .iter()
        .any(|s| s == "openid"));
}

#[tokio::test]
async fn test_dynamics_config_requires_sign_in() {
    let mut harness = PortalHarness::new().await;

    let (status, body) = harness.send("GET", "/api/dynamics-config").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthenticated");
    assert_eq!(body["retryable"], true);

    harness.sign_in_ready().await;

    let (status, body) = harness.send("GET", "/api/dynamics-config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["baseUrl"].as_str().unwrap(),
        format!("{}/api/data/v9.2", harness.dynamics.url())
    );
    assert_eq!(body["apiVersion"], "9.2");
    assert_eq!(body["scopes"][0].as_str().unwrap(), harness.resource_scope());
}

#[tokio::test]
async fn test_session_starts_unauthenticated() {
    let harness = PortalHarness::new().await;

    let (status, body) = harness.send("GET", "/api/session").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"]["status"], "unauthenticated");
    assert_eq!(body["authenticated"], false);
    assert_eq!(body["downstreamReady"], false);
    assert!(body["account"].is_null());
    assert!(body["pendingInteraction"].is_null());
}

#[tokio::test]
async fn test_token_request_before_sign_in_is_unauthorized() {
    let harness = PortalHarness::new().await;

    let (status, body) = harness.send("POST", "/api/session/token").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthenticated");
}

#[tokio::test]
async fn test_sign_out_when_signed_out_is_harmless() {
    let harness = PortalHarness::new().await;

    let (status, body) = harness.send("POST", "/api/session/sign-out").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"]["status"], "unauthenticated");
    assert!(body["endSessionUrl"].is_null());
}

#[tokio::test]
async fn test_callback_without_parameters_renders_page() {
    let harness = PortalHarness::new().await;

    let (status, body) = harness.send_raw("GET", CALLBACK_PATH).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<html>"));
}

#[tokio::test]
async fn test_records_require_sign_in() {
    let harness = PortalHarness::new().await;

    for uri in [
        "/api/records/cases",
        "/api/records/sales-orders",
        "/api/records/cases/8d0a7e4c-64b8-4f2c-9a6f-3a0b1f1e2d3c",
    ] {
        let (status, body) = harness.send("GET", uri).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["error"], "unauthenticated", "{uri}");
    }
}
