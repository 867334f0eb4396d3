//! Recording [`SlackApi`] fake for handler and router tests.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    api::{InteractiveResponse, PostedMessage, SlackApi, SlackApiError},
    blocks::{OutgoingMessage, View},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackCall {
    OpenView { trigger_id: String, view: View },
    PostMessage(OutgoingMessage),
    Respond { response_url: String, response: InteractiveResponse },
}

/// Records every outbound call; each method fails with its configured error, if any.
#[derive(Default)]
pub struct RecordingSlackApi {
    calls: Mutex<Vec<SlackCall>>,
    open_error: Option<SlackApiError>,
    post_error: Option<SlackApiError>,
    respond_error: Option<SlackApiError>,
}

impl RecordingSlackApi {
    pub fn failing_opens(error: SlackApiError) -> Self {
        Self { open_error: Some(error), ..Self::default() }
    }

    pub fn failing_posts(error: SlackApiError) -> Self {
        Self { post_error: Some(error), ..Self::default() }
    }

    pub fn failing_responds(error: SlackApiError) -> Self {
        Self { respond_error: Some(error), ..Self::default() }
    }

    pub async fn calls(&self) -> Vec<SlackCall> {
        self.calls.lock().await.clone()
    }
}

#[async_trait]
impl SlackApi for RecordingSlackApi {
    async fn open_view(&self, trigger_id: &str, view: &View) -> Result<(), SlackApiError> {
        self.calls
            .lock()
            .await
            .push(SlackCall::OpenView { trigger_id: trigger_id.to_owned(), view: view.clone() });
        match &self.open_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    async fn post_message(
        &self,
        message: &OutgoingMessage,
    ) -> Result<PostedMessage, SlackApiError> {
        self.calls.lock().await.push(SlackCall::PostMessage(message.clone()));
        match &self.post_error {
            Some(error) => Err(error.clone()),
            None => Ok(PostedMessage {
                channel: Some(message.channel.clone()),
                ts: Some("1700000000.000100".to_owned()),
            }),
        }
    }

    async fn respond(
        &self,
        response_url: &str,
        response: &InteractiveResponse,
    ) -> Result<(), SlackApiError> {
        self.calls.lock().await.push(SlackCall::Respond {
            response_url: response_url.to_owned(),
            response: response.clone(),
        });
        match &self.respond_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}
