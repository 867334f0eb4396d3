use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use signoff_core::ApplicationError;
use thiserror::Error;

use crate::approval::{ActionError, SubmissionError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PayloadError {
    #[error("form body could not be decoded: {0}")]
    Form(String),
    #[error("form body has no `{0}` field")]
    MissingField(&'static str),
    #[error("payload is not valid JSON: {0}")]
    Json(String),
}

// ---------------------------------------------------------------------------
// Events API
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize)]
struct EventsRequest {
    #[serde(rename = "type", default)]
    event_type: Option<String>,
    #[serde(default)]
    challenge: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct UrlVerification {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub challenge: Option<Value>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventsError {
    #[error("events body is not a JSON object: {0}")]
    Malformed(String),
    #[error("unsupported event type `{0}`")]
    UnsupportedType(String),
    #[error("event body has no type")]
    MissingType,
}

/// Handles the Events API endpoint handshake. Only `url_verification` is
/// accepted; the challenge is echoed back exactly as received.
pub fn url_verification(body: &[u8]) -> Result<UrlVerification, EventsError> {
    let request: EventsRequest =
        serde_json::from_slice(body).map_err(|error| EventsError::Malformed(error.to_string()))?;

    match request.event_type.as_deref() {
        Some("url_verification") => Ok(UrlVerification { challenge: request.challenge }),
        Some(other) => Err(EventsError::UnsupportedType(other.to_owned())),
        None => Err(EventsError::MissingType),
    }
}

// ---------------------------------------------------------------------------
// Interactive payloads
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SlackUser {
    pub id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct StateValue {
    #[serde(default)]
    pub selected_user: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ViewState {
    #[serde(default)]
    pub values: HashMap<String, HashMap<String, StateValue>>,
}

impl ViewState {
    pub fn field(&self, block_id: &str, action_id: &str) -> Option<&StateValue> {
        self.values.get(block_id).and_then(|block| block.get(action_id))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SubmittedView {
    #[serde(default)]
    pub id: Option<String>,
    pub callback_id: String,
    #[serde(default)]
    pub state: ViewState,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ViewSubmission {
    pub user: SlackUser,
    pub view: SubmittedView,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct MessageAction {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct OriginalMessage {
    #[serde(default)]
    pub text: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct InteractiveMessage {
    pub callback_id: String,
    pub user: SlackUser,
    #[serde(default)]
    pub actions: Vec<MessageAction>,
    #[serde(default)]
    pub original_message: Option<OriginalMessage>,
    pub response_url: String,
    #[serde(default)]
    pub action_ts: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InteractionPayload {
    ViewSubmission(ViewSubmission),
    InteractiveMessage(InteractiveMessage),
    #[serde(other)]
    Unsupported,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InteractionKind {
    ViewSubmission,
    InteractiveMessage,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ViewSubmission => "view_submission",
            Self::InteractiveMessage => "interactive_message",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub kind: InteractionKind,
    pub callback_id: String,
}

impl RouteKey {
    pub fn new(kind: InteractionKind, callback_id: impl Into<String>) -> Self {
        Self { kind, callback_id: callback_id.into() }
    }
}

impl InteractionPayload {
    pub fn route_key(&self) -> Option<RouteKey> {
        match self {
            Self::ViewSubmission(submission) => {
                Some(RouteKey::new(InteractionKind::ViewSubmission, &submission.view.callback_id))
            }
            Self::InteractiveMessage(message) => {
                Some(RouteKey::new(InteractionKind::InteractiveMessage, &message.callback_id))
            }
            Self::Unsupported => None,
        }
    }

    /// Best identifier Slack gives us for log correlation.
    pub fn correlation_hint(&self) -> Option<&str> {
        match self {
            Self::ViewSubmission(submission) => submission.view.id.as_deref(),
            Self::InteractiveMessage(message) => message.action_ts.as_deref(),
            Self::Unsupported => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct InteractionForm {
    #[serde(default)]
    payload: Option<String>,
}

/// Parses the `payload=<json>` form body Slack posts for interactions.
pub fn parse_interaction_form(body: &[u8]) -> Result<InteractionPayload, PayloadError> {
    let form: InteractionForm =
        serde_urlencoded::from_bytes(body).map_err(|error| PayloadError::Form(error.to_string()))?;
    let payload = form.payload.ok_or(PayloadError::MissingField("payload"))?;
    serde_json::from_str(&payload).map_err(|error| PayloadError::Json(error.to_string()))
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

/// Synchronous answer to a `view_submission`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "response_action", rename_all = "snake_case")]
pub enum ViewResponse {
    Clear,
    Errors { errors: BTreeMap<String, String> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    ViewResponse(ViewResponse),
    Acknowledged,
    Ignored,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Action(#[from] ActionError),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

impl From<DispatchError> for ApplicationError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Handler(EventHandlerError::Submission(error)) => error.into(),
            DispatchError::Handler(EventHandlerError::Action(error)) => error.into(),
        }
    }
}

#[async_trait]
pub trait InteractionHandler: Send + Sync {
    fn route(&self) -> RouteKey;
    async fn handle(
        &self,
        payload: &InteractionPayload,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct InteractionDispatcher {
    handlers: HashMap<RouteKey, Arc<dyn InteractionHandler>>,
}

impl InteractionDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: InteractionHandler + 'static,
    {
        self.handlers.insert(handler.route(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        payload: &InteractionPayload,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = payload.route_key().and_then(|key| self.handlers.get(&key)) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(payload, ctx).await.map_err(DispatchError::from)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;

    use super::{
        parse_interaction_form, url_verification, EventContext, EventHandlerError,
        EventsError, HandlerResult, InteractionDispatcher, InteractionHandler, InteractionKind,
        InteractionPayload, PayloadError, RouteKey, ViewResponse,
    };

    struct FixedHandler {
        route: RouteKey,
    }

    #[async_trait]
    impl InteractionHandler for FixedHandler {
        fn route(&self) -> RouteKey {
            self.route.clone()
        }

        async fn handle(
            &self,
            _payload: &InteractionPayload,
            _ctx: &EventContext,
        ) -> Result<HandlerResult, EventHandlerError> {
            Ok(HandlerResult::ViewResponse(ViewResponse::Clear))
        }
    }

    fn form_encode(payload: &serde_json::Value) -> Vec<u8> {
        format!("payload={}", urlencoding::encode(&payload.to_string())).into_bytes()
    }

    #[test]
    fn url_verification_echoes_challenge_verbatim() {
        let challenges =
            [json!("3eZbrw1aBm2rZgRNFdxV2595E9CY3gmdALWMmHkvFXO7tYXAYM8P"), json!(""), json!(42)];
        for challenge in challenges {
            let body =
                json!({ "type": "url_verification", "challenge": challenge.clone(), "token": "x" });
            let verification =
                url_verification(body.to_string().as_bytes()).expect("handshake accepted");
            assert_eq!(verification.challenge, Some(challenge));
        }
    }

    #[test]
    fn url_verification_without_challenge_omits_the_field() {
        let verification =
            url_verification(br#"{"type":"url_verification"}"#).expect("handshake accepted");

        assert_eq!(verification.challenge, None);
        assert_eq!(serde_json::to_value(&verification).expect("serializes"), json!({}));
    }

    #[test]
    fn other_event_types_are_rejected() {
        assert_eq!(
            url_verification(br#"{"type":"event_callback","challenge":"abc"}"#),
            Err(EventsError::UnsupportedType("event_callback".to_owned()))
        );
        assert_eq!(url_verification(br#"{"challenge":"abc"}"#), Err(EventsError::MissingType));
        assert!(matches!(
            url_verification(b"type=url_verification"),
            Err(EventsError::Malformed(_))
        ));
    }

    #[test]
    fn form_decoding_handles_plus_and_percent_encoding() {
        let payload = json!({
            "type": "view_submission",
            "user": { "id": "U1" },
            "view": {
                "callback_id": "approval_modal",
                "state": { "values": {
                    "text_block": { "approval_text": { "value": "please approve!" } }
                } }
            }
        });
        let body = format!(
            "token=x&payload={}",
            urlencoding::encode(&payload.to_string()).replace("%20", "+")
        );

        let parsed = parse_interaction_form(body.as_bytes()).expect("payload parses");
        let InteractionPayload::ViewSubmission(submission) = &parsed else {
            panic!("expected view submission, got {parsed:?}");
        };
        assert_eq!(
            submission.view.state.field("text_block", "approval_text").and_then(|v| v.value.as_deref()),
            Some("please approve!")
        );
    }

    #[test]
    fn parses_view_submission_state() {
        let body = form_encode(&json!({
            "type": "view_submission",
            "user": { "id": "U_REQUESTER" },
            "view": {
                "id": "V123",
                "callback_id": "approval_modal",
                "state": { "values": {
                    "approver_block": { "approver": { "type": "users_select", "selected_user": "U_APPROVER" } },
                    "text_block": { "approval_text": { "type": "plain_text_input", "value": "Please review" } }
                } }
            }
        }));

        let payload = parse_interaction_form(&body).expect("payload parses");
        let InteractionPayload::ViewSubmission(submission) = &payload else {
            panic!("expected view submission, got {payload:?}");
        };

        assert_eq!(submission.user.id, "U_REQUESTER");
        let state = &submission.view.state;
        assert_eq!(
            state.field("approver_block", "approver").and_then(|v| v.selected_user.as_deref()),
            Some("U_APPROVER")
        );
        assert_eq!(
            state.field("text_block", "approval_text").and_then(|v| v.value.as_deref()),
            Some("Please review")
        );
        assert_eq!(payload.correlation_hint(), Some("V123"));
        assert_eq!(
            payload.route_key(),
            Some(RouteKey::new(InteractionKind::ViewSubmission, "approval_modal"))
        );
    }

    #[test]
    fn parses_interactive_message_and_unknown_types() {
        let body = form_encode(&json!({
            "type": "interactive_message",
            "callback_id": "approval_request",
            "user": { "id": "U_APPROVER" },
            "actions": [{ "name": "approve", "type": "button", "value": "approve" }],
            "original_message": { "text": "You have a new approval request from <@U_REQUESTER>: hi" },
            "response_url": "https://hooks.slack.com/actions/T0/1/abc",
            "action_ts": "1700000000.1"
        }));

        let payload = parse_interaction_form(&body).expect("payload parses");
        assert!(matches!(
            &payload,
            InteractionPayload::InteractiveMessage(message)
                if message.actions[0].value.as_deref() == Some("approve")
                    && message.response_url.ends_with("/abc")
        ));

        let unknown = parse_interaction_form(&form_encode(&json!({ "type": "block_suggestion" })))
            .expect("unknown types still parse");
        assert_eq!(unknown, InteractionPayload::Unsupported);
        assert_eq!(unknown.route_key(), None);
    }

    #[test]
    fn missing_payload_field_is_reported() {
        assert_eq!(
            parse_interaction_form(b"token=abc"),
            Err(PayloadError::MissingField("payload"))
        );
        assert!(matches!(
            parse_interaction_form(b"payload=%7Bnot-json"),
            Err(PayloadError::Json(_))
        ));
    }

    #[tokio::test]
    async fn dispatcher_routes_by_kind_and_callback_id() {
        let mut dispatcher = InteractionDispatcher::new();
        dispatcher.register(FixedHandler {
            route: RouteKey::new(InteractionKind::ViewSubmission, "approval_modal"),
        });

        let matching = parse_interaction_form(&form_encode(&json!({
            "type": "view_submission",
            "user": { "id": "U1" },
            "view": { "callback_id": "approval_modal" }
        })))
        .expect("payload parses");
        let other_callback = parse_interaction_form(&form_encode(&json!({
            "type": "view_submission",
            "user": { "id": "U1" },
            "view": { "callback_id": "some_other_modal" }
        })))
        .expect("payload parses");

        let ctx = EventContext::default();
        assert_eq!(
            dispatcher.dispatch(&matching, &ctx).await,
            Ok(HandlerResult::ViewResponse(ViewResponse::Clear))
        );
        assert_eq!(dispatcher.dispatch(&other_callback, &ctx).await, Ok(HandlerResult::Ignored));
        assert_eq!(
            dispatcher.dispatch(&InteractionPayload::Unsupported, &ctx).await,
            Ok(HandlerResult::Ignored)
        );
    }

    #[test]
    fn view_response_serializes_response_action() {
        assert_eq!(
            serde_json::to_value(ViewResponse::Clear).expect("serializes"),
            json!({ "response_action": "clear" })
        );
    }
}
