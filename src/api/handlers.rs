use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tokio::task::JoinError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::views::{
    CaseListView, CaseView, InteractionView, SalesOrderListView, SessionView, SignOutView,
};
use crate::auth::providers::InteractionKind;
use crate::auth::surface::parse_redirect;
use crate::auth::{AuthSessionController, SessionSnapshot};
use crate::config::{IdentitySettings, ResourceSettings};
use crate::records::models::RecordFilter;
use crate::{PortalContext, PortalError, PortalResult};

type Ctx = State<Arc<PortalContext>>;

// ── Configuration ──────────────────────────────────────────────────

pub async fn auth_config(State(ctx): Ctx) -> Json<IdentitySettings> {
    Json(ctx.config.identity.settings())
}

pub async fn dynamics_config(State(ctx): Ctx) -> PortalResult<Json<ResourceSettings>> {
    require_authenticated(&ctx).await?;
    Ok(Json(ctx.config.resource.settings()))
}

// ── Session ────────────────────────────────────────────────────────

pub async fn session(State(ctx): Ctx) -> Json<SessionView> {
    Json(SessionView {
        snapshot: ctx.controller.snapshot().await,
        pending_interaction: ctx.surface.current_prompt(),
    })
}

pub async fn sign_in(State(ctx): Ctx) -> Response {
    start_interaction(&ctx, |controller| async move { controller.sign_in().await }).await
}

pub async fn acquire_token(State(ctx): Ctx) -> Response {
    start_interaction(&ctx, |controller| async move {
        controller.acquire_downstream_token().await
    })
    .await
}

pub async fn sign_out(State(ctx): Ctx) -> PortalResult<Json<SignOutView>> {
    let (snapshot, end_session_url) = ctx.sign_out().await?;
    Ok(Json(SignOutView {
        snapshot,
        end_session_url,
    }))
}

/// Run a session operation that may need the user at the provider.
///
/// Answers 200 with the snapshot when the operation finishes on its own, or
/// 202 with the provider URL as soon as it parks on an interactive prompt.
/// In the latter case the operation keeps running and finishes when the
/// redirect comes back.
async fn start_interaction<F, Fut>(ctx: &PortalContext, operation: F) -> Response
where
    F: FnOnce(Arc<AuthSessionController>) -> Fut,
    Fut: Future<Output = PortalResult<SessionSnapshot>> + Send + 'static,
{
    // Subscribe first so a prompt raised right away is not missed
    let mut prompts = ctx.surface.subscribe_prompts();
    prompts.borrow_and_update();

    let mut task = tokio::spawn(operation(Arc::clone(&ctx.controller)));

    loop {
        tokio::select! {
            joined = &mut task => return finish_operation(joined),
            changed = prompts.changed() => {
                if changed.is_err() {
                    return finish_operation(task.await);
                }
                let prompt = prompts.borrow_and_update().clone();
                if let Some(prompt) = prompt.filter(|p| p.kind != InteractionKind::SignOut) {
                    debug!(kind = ?prompt.kind, "Operation waiting on user interaction");
                    let view = InteractionView {
                        authorize_url: prompt.url,
                        kind: prompt.kind,
                    };
                    return (StatusCode::ACCEPTED, Json(view)).into_response();
                }
            }
        }
    }
}

fn finish_operation(joined: Result<PortalResult<SessionSnapshot>, JoinError>) -> Response {
    match joined {
        Ok(Ok(snapshot)) => Json(snapshot).into_response(),
        Ok(Err(e)) => e.into_response(),
        Err(e) => {
            error!(error = %e, "Session operation task failed");
            let body = json!({
                "error": "internal",
                "message": "Session operation failed",
                "retryable": true,
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

/// Provider redirect target
pub async fn redirect_callback(
    State(ctx): Ctx,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if params.is_empty() {
        return Html(page("Case portal", "Nothing to complete here.")).into_response();
    }

    let completed = parse_redirect(&params).and_then(|response| ctx.surface.complete(response));
    match completed {
        Ok(()) => {
            info!("Authorization redirect accepted");
            Html(page("Signed in", "You can return to the portal.")).into_response()
        }
        Err(e) => {
            warn!(error = %e, "Authorization redirect rejected");
            let status = PortalError::from(e.clone()).category().status_code();
            (status, Html(page("Sign-in failed", &e.to_string()))).into_response()
        }
    }
}

fn page(title: &str, message: &str) -> String {
    format!(
        "<!doctype html><html><head><title>{title}</title></head>\
         <body><h1>{title}</h1><p>{}</p></body></html>",
        escape_html(message)
    )
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ── Records ────────────────────────────────────────────────────────

pub async fn list_cases(
    State(ctx): Ctx,
    Query(filter): Query<RecordFilter>,
) -> PortalResult<Response> {
    require_authenticated(&ctx).await?;
    let cases = ctx.records.fetch_cases(&filter).await?;
    Ok(Json(CaseListView::new(&cases)).into_response())
}

pub async fn get_case(State(ctx): Ctx, Path(id): Path<Uuid>) -> PortalResult<Response> {
    require_authenticated(&ctx).await?;
    match ctx.records.fetch_case(id).await? {
        Some(case) => Ok(Json(CaseView::from(&case)).into_response()),
        None => {
            let body = json!({
                "error": "not_found",
                "message": format!("Case {id} not found"),
                "retryable": false,
            });
            Ok((StatusCode::NOT_FOUND, Json(body)).into_response())
        }
    }
}

pub async fn list_sales_orders(
    State(ctx): Ctx,
    Query(filter): Query<RecordFilter>,
) -> PortalResult<Response> {
    require_authenticated(&ctx).await?;
    let orders = ctx.records.fetch_sales_orders(&filter).await?;
    Ok(Json(SalesOrderListView::new(&orders)).into_response())
}

async fn require_authenticated(ctx: &PortalContext) -> PortalResult<()> {
    if ctx.controller.session().await.authenticated() {
        Ok(())
    } else {
        Err(PortalError::Unauthenticated)
    }
}
