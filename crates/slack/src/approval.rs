//! Approval protocol handlers.
//!
//! - `approval_modal` view submission: read the modal state, DM the approver.
//! - `approval_request` button click: notify the requester, replace the
//!   approver's message with the decision.
//!
//! The requester is not carried in the button payload. It is recovered from the
//! `<@ID>` mention in the approver's message, which
//! [`ApprovalRequest::notification_text`] always writes.

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use signoff_core::{
    ApplicationError, ApprovalDecision, ApprovalRequest, ApprovalStage, Decision, DomainError,
    UserId,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    api::{InteractiveResponse, SlackApi, SlackApiError},
    blocks::{
        approval_request_message, OutgoingMessage, APPROVAL_MODAL_CALLBACK_ID,
        APPROVAL_REQUEST_CALLBACK_ID, APPROVER_ACTION_ID, APPROVER_BLOCK_ID, TEXT_ACTION_ID,
        TEXT_BLOCK_ID,
    },
    events::{
        EventContext, EventHandlerError, HandlerResult, InteractionDispatcher, InteractionHandler,
        InteractionKind, InteractionPayload, InteractiveMessage, RouteKey, ViewResponse,
        ViewSubmission,
    },
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("submission is missing `{block_id}.{action_id}`")]
    MissingField { block_id: &'static str, action_id: &'static str },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("interactive payload has no actions")]
    NoAction,
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("decision could not be delivered: {0}")]
    Delivery(#[from] SlackApiError),
}

impl From<SubmissionError> for ApplicationError {
    fn from(value: SubmissionError) -> Self {
        Self::Payload(value.to_string())
    }
}

impl From<ActionError> for ApplicationError {
    fn from(value: ActionError) -> Self {
        match value {
            ActionError::Domain(error) => Self::Domain(error),
            ActionError::Delivery(error) => Self::Integration(error.to_string()),
            ActionError::NoAction => Self::Payload(value.to_string()),
        }
    }
}

/// Registers both approval handlers against one Slack client.
pub fn approval_dispatcher(api: Arc<dyn SlackApi>) -> InteractionDispatcher {
    let mut dispatcher = InteractionDispatcher::new();
    dispatcher.register(ApprovalSubmissionHandler::new(api.clone()));
    dispatcher.register(ApprovalActionHandler::new(api));
    dispatcher
}

/// Builds the request from a submitted `approval_modal`.
pub fn approval_request_from_submission(
    submission: &ViewSubmission,
) -> Result<ApprovalRequest, SubmissionError> {
    let state = &submission.view.state;

    let approver = state
        .field(APPROVER_BLOCK_ID, APPROVER_ACTION_ID)
        .and_then(|field| field.selected_user.as_deref())
        .filter(|user| !user.is_empty())
        .ok_or(SubmissionError::MissingField {
            block_id: APPROVER_BLOCK_ID,
            action_id: APPROVER_ACTION_ID,
        })?;
    let text = state
        .field(TEXT_BLOCK_ID, TEXT_ACTION_ID)
        .and_then(|field| field.value.as_deref())
        .ok_or(SubmissionError::MissingField { block_id: TEXT_BLOCK_ID, action_id: TEXT_ACTION_ID })?;

    Ok(ApprovalRequest::new(
        UserId::new(submission.user.id.clone()),
        UserId::new(approver),
        text,
    ))
}

/// Reads the clicked button and recovers the requester from the original message.
pub fn approval_decision_from_message(
    message: &InteractiveMessage,
) -> Result<ApprovalDecision, ActionError> {
    let action = message.actions.first().ok_or(ActionError::NoAction)?;
    let decision = Decision::from_button_value(action.value.as_deref().unwrap_or_default());
    let original_text =
        message.original_message.as_ref().map(|original| original.text.as_str()).unwrap_or("");

    Ok(ApprovalDecision::from_original_message(
        UserId::new(message.user.id.clone()),
        decision,
        original_text,
    )?)
}

pub struct ApprovalSubmissionHandler {
    api: Arc<dyn SlackApi>,
}

impl ApprovalSubmissionHandler {
    pub fn new(api: Arc<dyn SlackApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl InteractionHandler for ApprovalSubmissionHandler {
    fn route(&self) -> RouteKey {
        RouteKey::new(InteractionKind::ViewSubmission, APPROVAL_MODAL_CALLBACK_ID)
    }

    async fn handle(
        &self,
        payload: &InteractionPayload,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let InteractionPayload::ViewSubmission(submission) = payload else {
            return Ok(HandlerResult::Ignored);
        };

        let request = approval_request_from_submission(submission)?;
        info!(
            event_name = "approval.request.submitted",
            correlation_id = %ctx.correlation_id,
            requester = %request.requester,
            approver = %request.approver,
            "approval request submitted"
        );

        match self.api.post_message(&approval_request_message(&request)).await {
            Ok(_) => {
                info!(
                    event_name = "approval.request.delivered",
                    correlation_id = %ctx.correlation_id,
                    requester = %request.requester,
                    approver = %request.approver,
                    stage = ApprovalStage::Pending.as_str(),
                    "approval request delivered to approver"
                );
                Ok(HandlerResult::ViewResponse(ViewResponse::Clear))
            }
            Err(error) => {
                warn!(
                    event_name = "approval.request.delivery_failed",
                    correlation_id = %ctx.correlation_id,
                    approver = %request.approver,
                    error = %error,
                    "approval request could not be delivered; keeping modal open"
                );
                let mut errors = BTreeMap::new();
                errors.insert(
                    TEXT_BLOCK_ID.to_owned(),
                    format!(
                        "Could not deliver the request to {}. Please try again.",
                        request.approver.mention()
                    ),
                );
                Ok(HandlerResult::ViewResponse(ViewResponse::Errors { errors }))
            }
        }
    }
}

pub struct ApprovalActionHandler {
    api: Arc<dyn SlackApi>,
}

impl ApprovalActionHandler {
    pub fn new(api: Arc<dyn SlackApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl InteractionHandler for ApprovalActionHandler {
    fn route(&self) -> RouteKey {
        RouteKey::new(InteractionKind::InteractiveMessage, APPROVAL_REQUEST_CALLBACK_ID)
    }

    async fn handle(
        &self,
        payload: &InteractionPayload,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let InteractionPayload::InteractiveMessage(message) = payload else {
            return Ok(HandlerResult::Ignored);
        };

        let decision = approval_decision_from_message(message)?;
        let summary = decision.summary();

        self.api
            .post_message(&OutgoingMessage::text(decision.requester.as_str(), summary.clone()))
            .await
            .map_err(ActionError::from)?;

        info!(
            event_name = "approval.decision.recorded",
            correlation_id = %ctx.correlation_id,
            requester = %decision.requester,
            approver = %decision.approver,
            decision = decision.decision.value(),
            stage = ApprovalStage::Resolved(decision.decision).as_str(),
            "approval decision relayed to requester"
        );

        // The requester already has the outcome; a failed replace only leaves stale buttons.
        if let Err(error) = self
            .api
            .respond(&message.response_url, &InteractiveResponse::replace_original(summary))
            .await
        {
            warn!(
                event_name = "approval.decision.replace_failed",
                correlation_id = %ctx.correlation_id,
                error = %error,
                "could not replace the approver's original message"
            );
        }

        Ok(HandlerResult::Acknowledged)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use signoff_core::{ApplicationError, DomainError};

    use super::{approval_dispatcher, ActionError};
    use crate::{
        api::{InteractiveResponse, SlackApiError},
        blocks::OutgoingMessage,
        events::{
            DispatchError, EventContext, EventHandlerError, HandlerResult, InteractionPayload,
            ViewResponse,
        },
        testing::{RecordingSlackApi, SlackCall},
    };

    fn payload(value: serde_json::Value) -> InteractionPayload {
        serde_json::from_value(value).expect("payload deserializes")
    }

    fn submission(approver: Option<&str>, text: Option<&str>) -> InteractionPayload {
        let mut values = serde_json::Map::new();
        if let Some(approver) = approver {
            values.insert(
                "approver_block".to_owned(),
                json!({ "approver": { "type": "users_select", "selected_user": approver } }),
            );
        }
        if let Some(text) = text {
            values.insert(
                "text_block".to_owned(),
                json!({ "approval_text": { "type": "plain_text_input", "value": text } }),
            );
        }
        payload(json!({
            "type": "view_submission",
            "user": { "id": "U_REQUESTER" },
            "view": { "id": "V1", "callback_id": "approval_modal", "state": { "values": values } }
        }))
    }

    fn action(value: &str, original_text: &str) -> InteractionPayload {
        payload(json!({
            "type": "interactive_message",
            "callback_id": "approval_request",
            "user": { "id": "U_APPROVER" },
            "actions": [{ "name": value, "type": "button", "value": value }],
            "original_message": { "text": original_text },
            "response_url": "https://hooks.slack.com/actions/T0/1/abc"
        }))
    }

    #[tokio::test]
    async fn submission_sends_approver_dm_with_buttons_and_clears_modal() {
        let api = Arc::new(RecordingSlackApi::default());
        let dispatcher = approval_dispatcher(api.clone());

        let result = dispatcher
            .dispatch(&submission(Some("U_APPROVER"), Some("Please review")), &EventContext::default())
            .await;

        assert_eq!(result, Ok(HandlerResult::ViewResponse(ViewResponse::Clear)));
        let calls = api.calls().await;
        assert_eq!(calls.len(), 1);
        let SlackCall::PostMessage(message) = &calls[0] else {
            panic!("expected post message, got {calls:?}");
        };
        assert_eq!(message.channel, "U_APPROVER");
        assert!(message.text.contains("<@U_REQUESTER>"));
        assert!(message.text.contains("Please review"));

        let buttons: Vec<&str> = message.attachments[0]
            .actions
            .iter()
            .map(|button| button.value.as_str())
            .collect();
        assert_eq!(buttons, vec!["approve", "reject"]);
        assert_eq!(message.attachments[0].callback_id, "approval_request");
    }

    #[tokio::test]
    async fn submission_without_approver_fails_before_posting() {
        let api = Arc::new(RecordingSlackApi::default());
        let dispatcher = approval_dispatcher(api.clone());

        let result =
            dispatcher.dispatch(&submission(None, Some("hi")), &EventContext::default()).await;

        assert!(matches!(
            result,
            Err(DispatchError::Handler(EventHandlerError::Submission(_)))
        ));
        assert!(api.calls().await.is_empty());
    }

    #[tokio::test]
    async fn failed_delivery_keeps_modal_open_with_field_error() {
        let api = Arc::new(RecordingSlackApi::failing_posts(SlackApiError::Api {
            method: "chat.postMessage".to_owned(),
            error: "channel_not_found".to_owned(),
        }));
        let dispatcher = approval_dispatcher(api.clone());

        let result = dispatcher
            .dispatch(&submission(Some("U_APPROVER"), Some("Please review")), &EventContext::default())
            .await;

        let Ok(HandlerResult::ViewResponse(ViewResponse::Errors { errors })) = result else {
            panic!("expected view errors, got {result:?}");
        };
        assert!(errors.get("text_block").is_some_and(|message| message.contains("<@U_APPROVER>")));
    }

    #[tokio::test]
    async fn approve_notifies_requester_and_replaces_original() {
        let api = Arc::new(RecordingSlackApi::default());
        let dispatcher = approval_dispatcher(api.clone());

        let result = dispatcher
            .dispatch(
                &action("approve", "You have a new approval request from <@U_REQUESTER>: hi"),
                &EventContext::default(),
            )
            .await;

        assert_eq!(result, Ok(HandlerResult::Acknowledged));
        let expected = "<@U_APPROVER> has approved the request from <@U_REQUESTER>.";
        assert_eq!(
            api.calls().await,
            vec![
                SlackCall::PostMessage(OutgoingMessage::text("U_REQUESTER", expected)),
                SlackCall::Respond {
                    response_url: "https://hooks.slack.com/actions/T0/1/abc".to_owned(),
                    response: InteractiveResponse { text: expected.to_owned(), replace_original: true },
                },
            ]
        );
    }

    #[tokio::test]
    async fn reject_changes_only_the_verb() {
        let api = Arc::new(RecordingSlackApi::default());
        let dispatcher = approval_dispatcher(api.clone());

        dispatcher
            .dispatch(
                &action("reject", "You have a new approval request from <@U_REQUESTER>: hi"),
                &EventContext::default(),
            )
            .await
            .expect("reject handled");

        let calls = api.calls().await;
        assert!(matches!(
            &calls[0],
            SlackCall::PostMessage(message)
                if message.text == "<@U_APPROVER> has rejected the request from <@U_REQUESTER>."
        ));
    }

    #[tokio::test]
    async fn missing_mention_fails_before_any_outbound_call() {
        let api = Arc::new(RecordingSlackApi::default());
        let dispatcher = approval_dispatcher(api.clone());

        let result = dispatcher
            .dispatch(&action("approve", "a request from somebody"), &EventContext::default())
            .await;

        assert_eq!(
            result,
            Err(DispatchError::Handler(EventHandlerError::Action(ActionError::Domain(
                DomainError::MissingRequesterMention
            ))))
        );
        assert!(api.calls().await.is_empty());
    }

    #[tokio::test]
    async fn any_value_other_than_approve_counts_as_rejection() {
        let api = Arc::new(RecordingSlackApi::default());
        let dispatcher = approval_dispatcher(api.clone());

        let result = dispatcher
            .dispatch(&action("Reject", "from <@U_REQUESTER>"), &EventContext::default())
            .await;

        assert_eq!(result, Ok(HandlerResult::Acknowledged));
        let expected = "<@U_APPROVER> has rejected the request from <@U_REQUESTER>.";
        assert_eq!(
            api.calls().await,
            vec![
                SlackCall::PostMessage(OutgoingMessage::text("U_REQUESTER", expected)),
                SlackCall::Respond {
                    response_url: "https://hooks.slack.com/actions/T0/1/abc".to_owned(),
                    response: InteractiveResponse::replace_original(expected),
                },
            ]
        );
    }

    #[tokio::test]
    async fn click_without_actions_fails_before_any_outbound_call() {
        let api = Arc::new(RecordingSlackApi::default());
        let dispatcher = approval_dispatcher(api.clone());
        let mut click = action("approve", "from <@U_REQUESTER>");
        if let InteractionPayload::InteractiveMessage(message) = &mut click {
            message.actions.clear();
        }

        let result = dispatcher.dispatch(&click, &EventContext::default()).await;

        assert_eq!(
            result,
            Err(DispatchError::Handler(EventHandlerError::Action(ActionError::NoAction)))
        );
        assert!(api.calls().await.is_empty());
    }

    #[tokio::test]
    async fn failed_requester_notification_skips_replace_and_maps_to_integration_error() {
        let api = Arc::new(RecordingSlackApi::failing_posts(SlackApiError::Request(
            "connection reset".to_owned(),
        )));
        let dispatcher = approval_dispatcher(api.clone());

        let result = dispatcher
            .dispatch(&action("approve", "from <@U_REQUESTER>"), &EventContext::default())
            .await;

        let error = result.expect_err("delivery failure should surface");
        assert!(matches!(ApplicationError::from(error), ApplicationError::Integration(_)));
        assert!(api
            .calls()
            .await
            .iter()
            .all(|call| !matches!(call, SlackCall::Respond { .. })));
    }

    #[tokio::test]
    async fn failed_replace_still_acknowledges_decision() {
        let api = Arc::new(RecordingSlackApi::failing_responds(SlackApiError::Response(
            "response_url returned 404 Not Found: expired_url".to_owned(),
        )));
        let dispatcher = approval_dispatcher(api.clone());

        let result = dispatcher
            .dispatch(&action("approve", "from <@U_REQUESTER>"), &EventContext::default())
            .await;

        assert_eq!(result, Ok(HandlerResult::Acknowledged));
    }

    #[tokio::test]
    async fn repeated_click_sends_a_second_notification() {
        let api = Arc::new(RecordingSlackApi::default());
        let dispatcher = approval_dispatcher(api.clone());
        let click = action("approve", "from <@U_REQUESTER>");

        for _ in 0..2 {
            dispatcher.dispatch(&click, &EventContext::default()).await.expect("click handled");
        }

        let notifications = api
            .calls()
            .await
            .into_iter()
            .filter(|call| matches!(call, SlackCall::PostMessage(_)))
            .count();
        assert_eq!(notifications, 2);
    }
}
