//! Session lifecycle driven through the HTTP surface

use axum::http::StatusCode;
use mockito::Matcher;
use serde_json::json;

use caseportal_lib::auth::providers::InteractionKind;
use caseportal_lib::auth::SessionState;

use crate::test_harness::{query_param, PortalHarness, CALLBACK_PATH, RESOURCE_TOKEN, TOKEN_PATH};

#[tokio::test]
async fn test_sign_in_then_silent_token_reaches_ready() {
    let mut harness = PortalHarness::new().await;
    harness.sign_in_ready().await;

    let (status, body) = harness.send("GET", "/api/session").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"]["status"], "ready");
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["downstreamReady"], true);
    assert_eq!(body["displayName"], "Ada Lovelace");
    assert_eq!(body["account"]["username"], "ada@contoso.com");
    assert!(body["pendingInteraction"].is_null());

    assert!(harness.ctx.records.has_valid_token().await);
    assert_eq!(harness.ctx.surface.pending_count(), 0);
}

#[tokio::test]
async fn test_authorize_url_carries_pkce_and_identity_scopes() {
    let harness = PortalHarness::new().await;
    let authorize_url = harness.begin_sign_in().await;

    assert_eq!(authorize_url.path(), "/contoso/oauth2/v2.0/authorize");
    assert_eq!(
        query_param(&authorize_url, "client_id").as_deref(),
        Some("portal-client")
    );
    assert_eq!(
        query_param(&authorize_url, "code_challenge_method").as_deref(),
        Some("S256")
    );
    assert!(query_param(&authorize_url, "code_challenge").is_some());

    let scope = query_param(&authorize_url, "scope").unwrap();
    assert!(scope.contains("openid"));
    assert!(!scope.contains(".default"), "sign-in must not ask for resource scopes");

    // The prompt is visible to anyone polling the session
    let (_, body) = harness.send("GET", "/api/session").await;
    assert_eq!(body["state"]["status"], "authenticating");
    assert_eq!(body["pendingInteraction"]["kind"], "sign_in");
}

#[tokio::test]
async fn test_second_sign_in_while_waiting_is_rejected() {
    let harness = PortalHarness::new().await;
    let _authorize_url = harness.begin_sign_in().await;

    let (status, body) = harness.send("POST", "/api/session/sign-in").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "auth_in_progress");
}

#[tokio::test]
async fn test_user_declining_sign_in_returns_to_unauthenticated() {
    let harness = PortalHarness::new().await;
    let authorize_url = harness.begin_sign_in().await;

    let status = harness
        .redirect_with(&authorize_url, &[("error", "access_denied")])
        .await;
    assert_eq!(status, StatusCode::OK);

    harness
        .wait_for_state(|s| matches!(s, SessionState::Unauthenticated))
        .await;
    let session = harness.ctx.controller.session().await;
    assert!(!session.authenticated());
    assert!(session.account().is_none());
}

#[tokio::test]
async fn test_redirect_with_unknown_state_is_rejected() {
    let harness = PortalHarness::new().await;
    let _authorize_url = harness.begin_sign_in().await;

    let (status, body) = harness
        .send_raw("GET", &format!("{CALLBACK_PATH}?code=abc&state=forged"))
        .await;
    assert!(status.is_client_error());
    assert!(body.contains("Sign-in failed"));

    // The real authorization is still waiting
    assert_eq!(harness.ctx.surface.pending_count(), 1);
}

#[tokio::test]
async fn test_silent_failure_falls_back_to_one_interactive_attempt() {
    let mut harness = PortalHarness::new().await;
    harness.mock_refresh_failure("interaction_required").await;

    let authorize_url = harness.begin_sign_in().await;
    let nonce = query_param(&authorize_url, "nonce").unwrap();
    harness.mock_code_exchange("sign-in-code", &nonce).await;
    harness
        .redirect_with(&authorize_url, &[("code", "sign-in-code")])
        .await;

    // The interactive attempt surfaces as a resource-token prompt with a login hint
    let resource_url = harness.wait_for_prompt(InteractionKind::ResourceToken).await;
    assert_eq!(
        query_param(&resource_url, "login_hint").as_deref(),
        Some("ada@contoso.com")
    );
    assert!(query_param(&resource_url, "scope")
        .unwrap()
        .contains(&harness.resource_scope()));

    let exchange = harness
        .identity
        .mock("POST", TOKEN_PATH)
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("code".into(), "resource-code".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "access_token": RESOURCE_TOKEN,
                "expires_in": 3600,
                "scope": harness.resource_scope(),
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    harness
        .redirect_with(&resource_url, &[("code", "resource-code")])
        .await;
    harness
        .wait_for_state(|s| matches!(s, SessionState::Ready))
        .await;
    exchange.assert_async().await;
}

#[tokio::test]
async fn test_declined_resource_prompt_leaves_error_state_and_retry_works() {
    let mut harness = PortalHarness::new().await;
    harness.mock_refresh_failure("invalid_grant").await;

    let authorize_url = harness.begin_sign_in().await;
    let nonce = query_param(&authorize_url, "nonce").unwrap();
    harness.mock_code_exchange("sign-in-code", &nonce).await;
    harness
        .redirect_with(&authorize_url, &[("code", "sign-in-code")])
        .await;

    let resource_url = harness.wait_for_prompt(InteractionKind::ResourceToken).await;
    harness
        .redirect_with(&resource_url, &[("error", "access_denied")])
        .await;

    let state = harness
        .wait_for_state(|s| matches!(s, SessionState::Error { .. }))
        .await;
    assert!(matches!(state, SessionState::Error { .. }));

    // Still signed in, just without a resource token
    let (status, body) = harness.send("GET", "/api/session").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authenticated"], true);
    assert_eq!(body["downstreamReady"], false);

    // Retrying goes straight to the interactive prompt since the refresh token is gone
    let (status, body) = harness.send("POST", "/api/session/token").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["kind"], "resource_token");
}

#[tokio::test]
async fn test_sign_out_resets_session_and_returns_end_session_url() {
    let mut harness = PortalHarness::new().await;
    harness.sign_in_ready().await;

    let (status, body) = harness.send("POST", "/api/session/sign-out").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"]["status"], "unauthenticated");
    assert_eq!(body["authenticated"], false);
    assert!(body["account"].is_null());

    let end_session = url::Url::parse(body["endSessionUrl"].as_str().unwrap()).unwrap();
    assert_eq!(end_session.path(), "/contoso/oauth2/v2.0/logout");
    assert_eq!(
        query_param(&end_session, "post_logout_redirect_uri").as_deref(),
        Some("http://localhost:3000/auth/callback")
    );

    assert!(!harness.ctx.records.has_valid_token().await);
    let (status, _) = harness.send("GET", "/api/dynamics-config").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_sign_out_while_signing_in_cancels_the_prompt() {
    let harness = PortalHarness::new().await;
    let _authorize_url = harness.begin_sign_in().await;

    let (status, body) = harness.send("POST", "/api/session/sign-out").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["authenticated"], false);

    harness
        .wait_for_state(|s| matches!(s, SessionState::Unauthenticated))
        .await;
    assert_eq!(harness.ctx.surface.pending_count(), 0);
}
