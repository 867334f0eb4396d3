use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::FormRejection, Form, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use signoff_core::{ApplicationError, InterfaceError};
use signoff_slack::{
    api::SlackApi,
    approval::approval_dispatcher,
    commands::{ApprovalCommandHandler, SlashCommandPayload},
    events::{
        parse_interaction_form, url_verification, EventContext, HandlerResult,
        InteractionDispatcher,
    },
    signature::{SignatureVerifier, SIGNATURE_HEADER, TIMESTAMP_HEADER},
};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::health;

#[derive(Clone)]
pub struct AppState {
    commands: Arc<ApprovalCommandHandler>,
    dispatcher: Arc<InteractionDispatcher>,
    verifier: Arc<SignatureVerifier>,
}

impl AppState {
    pub fn new(api: Arc<dyn SlackApi>, verifier: SignatureVerifier) -> Self {
        Self {
            commands: Arc::new(ApprovalCommandHandler::new(api.clone())),
            dispatcher: Arc::new(approval_dispatcher(api)),
            verifier: Arc::new(verifier),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/slack/events", post(events))
        .route("/slack/commands", post(command).get(ssl_check))
        .route("/slack/actions", post(actions))
        .merge(health::router::<AppState>())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    correlation_id: &'a str,
}

/// Interface error rendered as the HTTP reply Slack sees.
#[derive(Debug)]
pub struct ApiError(InterfaceError);

impl ApiError {
    fn new(error: ApplicationError, correlation_id: &str) -> Self {
        Self(error.into_interface(correlation_id))
    }

    fn status(&self) -> StatusCode {
        match self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            InterfaceError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(
                event_name = "ingress.slack.request_failed",
                correlation_id = %self.0.correlation_id(),
                status = status.as_u16(),
                error = %self.0,
                "slack request failed"
            );
        } else {
            warn!(
                event_name = "ingress.slack.request_rejected",
                correlation_id = %self.0.correlation_id(),
                status = status.as_u16(),
                error = %self.0,
                "slack request rejected"
            );
        }

        let body = ErrorBody {
            error: self.0.user_message(),
            correlation_id: self.0.correlation_id(),
        };
        (status, Json(body)).into_response()
    }
}

async fn events(body: Bytes) -> Response {
    match url_verification(&body) {
        Ok(verification) => {
            info!(event_name = "ingress.slack.url_verification", "events endpoint verified");
            Json(verification).into_response()
        }
        Err(error) => {
            warn!(
                event_name = "ingress.slack.event_rejected",
                error = %error,
                "unsupported events request"
            );
            (StatusCode::BAD_REQUEST, "Invalid request").into_response()
        }
    }
}

async fn command(
    State(state): State<AppState>,
    payload: Result<Form<SlashCommandPayload>, FormRejection>,
) -> StatusCode {
    let payload = match payload {
        Ok(Form(payload)) => payload,
        Err(rejection) => {
            warn!(
                event_name = "ingress.slack.command_malformed",
                error = %rejection,
                "slash command body could not be decoded"
            );
            SlashCommandPayload::default()
        }
    };
    let ctx = EventContext { correlation_id: correlation_id(Some(payload.trigger_id.as_str())) };

    // Slack only needs the ack; an open failure is logged by the handler.
    state.commands.handle(&payload, &ctx).await;
    StatusCode::OK
}

/// Slack's `ssl_check` GET; query and body are ignored.
async fn ssl_check() -> &'static str {
    "OK"
}

async fn actions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request_id = correlation_id(None);

    state
        .verifier
        .verify(header(&headers, TIMESTAMP_HEADER), header(&headers, SIGNATURE_HEADER), &body)
        .map_err(|error| {
            ApiError::new(ApplicationError::Authentication(error.to_string()), &request_id)
        })?;

    let payload = parse_interaction_form(&body)
        .map_err(|error| ApiError::new(ApplicationError::Payload(error.to_string()), &request_id))?;
    let ctx = EventContext { correlation_id: correlation_id(payload.correlation_hint()) };

    let route = payload.route_key();
    info!(
        event_name = "ingress.slack.interaction_received",
        correlation_id = %ctx.correlation_id,
        kind = route.as_ref().map(|key| key.kind.as_str()).unwrap_or("unsupported"),
        callback_id = route.as_ref().map(|key| key.callback_id.as_str()).unwrap_or(""),
        "slack interaction received"
    );

    match state.dispatcher.dispatch(&payload, &ctx).await {
        Ok(HandlerResult::ViewResponse(response)) => Ok(Json(response).into_response()),
        Ok(HandlerResult::Acknowledged) => Ok(StatusCode::OK.into_response()),
        Ok(HandlerResult::Ignored) => {
            info!(
                event_name = "ingress.slack.interaction_ignored",
                correlation_id = %ctx.correlation_id,
                "no handler registered for interaction"
            );
            Ok(StatusCode::OK.into_response())
        }
        Err(error) => Err(ApiError::new(error.into(), &ctx.correlation_id)),
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn correlation_id(hint: Option<&str>) -> String {
    match hint {
        Some(hint) if !hint.is_empty() => hint.to_owned(),
        _ => Uuid::new_v4().to_string(),
    }
}
