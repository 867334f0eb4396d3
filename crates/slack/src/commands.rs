use std::sync::Arc;

use serde::Deserialize;
use signoff_core::ApprovalStage;
use tracing::{info, warn};

use crate::{
    api::{SlackApi, SlackApiError},
    blocks::{approval_modal, APPROVAL_MODAL_CALLBACK_ID},
    events::EventContext,
};

/// Form fields Slack posts with a slash command. Absent fields deserialize as
/// empty strings; Slack rejects an empty `trigger_id` on `views.open`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SlashCommandPayload {
    pub command: String,
    pub text: String,
    pub channel_id: String,
    pub user_id: String,
    pub trigger_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    ModalOpened,
    OpenFailed(SlackApiError),
}

/// Answers any slash command by opening the approval modal for its trigger.
pub struct ApprovalCommandHandler {
    api: Arc<dyn SlackApi>,
}

impl ApprovalCommandHandler {
    pub fn new(api: Arc<dyn SlackApi>) -> Self {
        Self { api }
    }

    pub async fn handle(&self, payload: &SlashCommandPayload, ctx: &EventContext) -> CommandOutcome {
        info!(
            event_name = "ingress.slack.command_received",
            correlation_id = %ctx.correlation_id,
            command = %payload.command,
            user_id = %payload.user_id,
            channel_id = %payload.channel_id,
            "slash command received"
        );

        match self.api.open_view(&payload.trigger_id, &approval_modal()).await {
            Ok(()) => {
                info!(
                    event_name = "approval.modal.opened",
                    correlation_id = %ctx.correlation_id,
                    callback_id = APPROVAL_MODAL_CALLBACK_ID,
                    stage = ApprovalStage::ModalOpen.as_str(),
                    "approval modal opened"
                );
                CommandOutcome::ModalOpened
            }
            Err(error) => {
                warn!(
                    event_name = "approval.modal.open_failed",
                    correlation_id = %ctx.correlation_id,
                    error = %error,
                    "approval modal could not be opened"
                );
                CommandOutcome::OpenFailed(error)
            }
        }
    }
}
