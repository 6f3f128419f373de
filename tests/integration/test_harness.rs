//! Integration test harness for the portal
//! Wires a real `PortalContext` to mockito servers standing in for the
//! identity provider and the Dynamics Web API

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::{json, Value};
use tower::ServiceExt;
use url::Url;

use caseportal_lib::api::router;
use caseportal_lib::auth::providers::InteractionKind;
use caseportal_lib::auth::SessionState;
use caseportal_lib::config::{
    AUTHORITY_HOST_KEY, CLIENT_ID_KEY, DYNAMICS_URL_KEY, INTERACTION_TIMEOUT_KEY,
    REDIRECT_URI_KEY, TENANT_ID_KEY,
};
use caseportal_lib::{Configuration, PortalContext};

pub const TENANT: &str = "contoso";
pub const CLIENT_ID: &str = "portal-client";
pub const CALLBACK_PATH: &str = "/auth/callback";
pub const TOKEN_PATH: &str = "/contoso/oauth2/v2.0/token";
pub const RESOURCE_TOKEN: &str = "resource-token";
pub const ACCOUNT_OID: &str = "00000000-0000-0000-0000-0000000000aa";

/// Test environment for integration tests
pub struct PortalHarness {
    /// Mock identity provider
    pub identity: ServerGuard,
    /// Mock Dynamics organization
    pub dynamics: ServerGuard,
    pub ctx: Arc<PortalContext>,
    pub app: Router,
    /// Mocks kept alive for the lifetime of the harness
    mocks: Vec<Mock>,
}

impl PortalHarness {
    pub async fn new() -> Self {
        let identity = mockito::Server::new_async().await;
        let dynamics = mockito::Server::new_async().await;

        let vars = HashMap::from([
            (CLIENT_ID_KEY, CLIENT_ID.to_string()),
            (TENANT_ID_KEY, TENANT.to_string()),
            (DYNAMICS_URL_KEY, dynamics.url()),
            (AUTHORITY_HOST_KEY, identity.url()),
            (REDIRECT_URI_KEY, format!("http://localhost:3000{CALLBACK_PATH}")),
            (INTERACTION_TIMEOUT_KEY, "10".to_string()),
        ]);
        let config = Configuration::from_lookup(|key| vars.get(key).cloned())
            .expect("test configuration should load");

        let ctx = Arc::new(PortalContext::new(config).expect("context should build"));
        let app = router(Arc::clone(&ctx));

        Self {
            identity,
            dynamics,
            ctx,
            app,
            mocks: Vec::new(),
        }
    }

    pub fn keep(&mut self, mock: Mock) {
        self.mocks.push(mock);
    }

    /// Send a request through the router and decode the JSON body
    pub async fn send(&self, method: &str, uri: &str) -> (StatusCode, Value) {
        let (status, body) = self.send_raw(method, uri).await;
        let value = serde_json::from_str(&body).unwrap_or(Value::Null);
        (status, value)
    }

    pub async fn send_raw(&self, method: &str, uri: &str) -> (StatusCode, String) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn resource_scope(&self) -> String {
        format!("{}/.default", self.dynamics.url())
    }

    /// Answer the authorization-code exchange for `code` with an ID token
    /// carrying `nonce`
    pub async fn mock_code_exchange(&mut self, code: &str, nonce: &str) {
        let body = json!({
            "access_token": "identity-token",
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": "openid profile email",
            "refresh_token": "refresh-1",
            "id_token": id_token(nonce),
        });
        let mock = self
            .identity
            .mock("POST", TOKEN_PATH)
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), code.into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;
        self.keep(mock);
    }

    /// Answer refresh-token redemption with the resource token
    pub async fn mock_refresh_success(&mut self) {
        let body = json!({
            "access_token": RESOURCE_TOKEN,
            "token_type": "Bearer",
            "expires_in": 3600,
            "scope": self.resource_scope(),
            "refresh_token": "refresh-2",
        });
        let mock = self
            .identity
            .mock("POST", TOKEN_PATH)
            .match_body(Matcher::UrlEncoded(
                "grant_type".into(),
                "refresh_token".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;
        self.keep(mock);
    }

    pub async fn mock_refresh_failure(&mut self, error: &str) {
        let body = json!({
            "error": error,
            "error_description": "AADSTS50076: interaction required",
        });
        let mock = self
            .identity
            .mock("POST", TOKEN_PATH)
            .match_body(Matcher::UrlEncoded(
                "grant_type".into(),
                "refresh_token".into(),
            ))
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await;
        self.keep(mock);
    }

    /// Start a sign-in and return the authorize URL the user is sent to
    pub async fn begin_sign_in(&self) -> Url {
        let (status, body) = self.send("POST", "/api/session/sign-in").await;
        assert_eq!(status, StatusCode::ACCEPTED, "unexpected body: {body}");
        assert_eq!(body["kind"], "sign_in");
        Url::parse(body["authorizeUrl"].as_str().unwrap()).unwrap()
    }

    /// Deliver the provider redirect for `authorize_url`
    pub async fn redirect_with(&self, authorize_url: &Url, params: &[(&str, &str)]) -> StatusCode {
        let state = query_param(authorize_url, "state").unwrap();
        let mut query = url::form_urlencoded::Serializer::new(String::new());
        query.append_pair("state", &state);
        query.extend_pairs(params);
        let uri = format!("{CALLBACK_PATH}?{}", query.finish());
        self.send_raw("GET", &uri).await.0
    }

    /// Full sign-in with a silent resource token
    pub async fn sign_in_ready(&mut self) {
        self.mock_refresh_success().await;

        let authorize_url = self.begin_sign_in().await;
        let nonce = query_param(&authorize_url, "nonce").unwrap();
        self.mock_code_exchange("sign-in-code", &nonce).await;

        let status = self.redirect_with(&authorize_url, &[("code", "sign-in-code")]).await;
        assert_eq!(status, StatusCode::OK);

        self.wait_for_state(|s| matches!(s, SessionState::Ready)).await;
    }

    /// Poll the controller until its state satisfies `check`
    pub async fn wait_for_state(&self, check: impl Fn(&SessionState) -> bool) -> SessionState {
        let controller = Arc::clone(&self.ctx.controller);
        tokio::time::timeout(Duration::from_secs(5), async move {
            loop {
                let state = controller.state().await;
                if check(&state) {
                    return state;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("session never reached the expected state")
    }

    /// Wait until the surface shows a prompt of `kind` and return its URL
    pub async fn wait_for_prompt(&self, kind: InteractionKind) -> Url {
        let mut prompts = self.ctx.surface.subscribe_prompts();
        let prompt = tokio::time::timeout(
            Duration::from_secs(5),
            prompts.wait_for(|p| p.as_ref().is_some_and(|p| p.kind == kind)),
        )
        .await
        .expect("prompt never appeared")
        .expect("prompt channel closed")
        .clone();
        Url::parse(&prompt.expect("prompt present").url).unwrap()
    }
}

pub fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Unsigned ID token for the test account
pub fn id_token(nonce: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let claims = json!({
        "oid": ACCOUNT_OID,
        "tid": TENANT,
        "preferred_username": "ada@contoso.com",
        "name": "Ada Lovelace",
        "nonce": nonce,
    });
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}
