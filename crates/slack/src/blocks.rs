use serde::Serialize;
use signoff_core::{ApprovalRequest, Decision};

pub const APPROVAL_MODAL_CALLBACK_ID: &str = "approval_modal";
pub const APPROVER_BLOCK_ID: &str = "approver_block";
pub const APPROVER_ACTION_ID: &str = "approver";
pub const TEXT_BLOCK_ID: &str = "text_block";
pub const TEXT_ACTION_ID: &str = "approval_text";
pub const APPROVAL_REQUEST_CALLBACK_ID: &str = "approval_request";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum TextObject {
    #[serde(rename = "plain_text")]
    Plain { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        Self::Plain { text: text.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputElement {
    UsersSelect {
        action_id: String,
        placeholder: TextObject,
    },
    PlainTextInput {
        action_id: String,
        multiline: bool,
        placeholder: TextObject,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Input { block_id: String, label: TextObject, element: InputElement },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum View {
    Modal { callback_id: String, title: TextObject, submit: TextObject, blocks: Vec<Block> },
}

impl View {
    pub fn callback_id(&self) -> &str {
        match self {
            Self::Modal { callback_id, .. } => callback_id,
        }
    }

    pub fn blocks(&self) -> &[Block] {
        match self {
            Self::Modal { blocks, .. } => blocks,
        }
    }
}

pub struct ModalBuilder {
    callback_id: String,
    title: String,
    submit: String,
    blocks: Vec<Block>,
}

impl ModalBuilder {
    pub fn new(callback_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            callback_id: callback_id.into(),
            title: title.into(),
            submit: "Submit".to_owned(),
            blocks: Vec::new(),
        }
    }

    pub fn submit(mut self, label: impl Into<String>) -> Self {
        self.submit = label.into();
        self
    }

    pub fn input<F>(mut self, block_id: impl Into<String>, label: impl Into<String>, build: F) -> Self
    where
        F: FnOnce(&mut InputBuilder),
    {
        let mut builder = InputBuilder::default();
        build(&mut builder);
        if let Some(element) = builder.element {
            self.blocks.push(Block::Input {
                block_id: block_id.into(),
                label: TextObject::plain(label),
                element,
            });
        }
        self
    }

    pub fn build(self) -> View {
        View::Modal {
            callback_id: self.callback_id,
            title: TextObject::plain(self.title),
            submit: TextObject::plain(self.submit),
            blocks: self.blocks,
        }
    }
}

#[derive(Default)]
pub struct InputBuilder {
    element: Option<InputElement>,
}

impl InputBuilder {
    pub fn users_select(
        &mut self,
        action_id: impl Into<String>,
        placeholder: impl Into<String>,
    ) -> &mut Self {
        self.element = Some(InputElement::UsersSelect {
            action_id: action_id.into(),
            placeholder: TextObject::plain(placeholder),
        });
        self
    }

    pub fn multiline_text(
        &mut self,
        action_id: impl Into<String>,
        placeholder: impl Into<String>,
    ) -> &mut Self {
        self.element = Some(InputElement::PlainTextInput {
            action_id: action_id.into(),
            multiline: true,
            placeholder: TextObject::plain(placeholder),
        });
        self
    }
}

/// Legacy message attachment. Its buttons arrive back as `interactive_message`
/// payloads that carry `original_message`, which the decision handler reads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Attachment {
    pub text: String,
    pub fallback: String,
    pub callback_id: String,
    pub color: String,
    pub attachment_type: String,
    pub actions: Vec<AttachmentButton>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AttachmentButton {
    pub name: String,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

impl AttachmentButton {
    pub fn for_decision(decision: Decision) -> Self {
        Self {
            name: decision.value().to_owned(),
            text: decision.label().to_owned(),
            kind: "button".to_owned(),
            value: decision.value().to_owned(),
        }
    }
}

/// Body of a `chat.postMessage` call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    pub channel: String,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl OutgoingMessage {
    pub fn text(channel: impl Into<String>, text: impl Into<String>) -> Self {
        Self { channel: channel.into(), text: text.into(), attachments: Vec::new() }
    }

    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

pub fn approval_modal() -> View {
    ModalBuilder::new(APPROVAL_MODAL_CALLBACK_ID, "Request Approval")
        .submit("Submit")
        .input(APPROVER_BLOCK_ID, "Approver", |input| {
            input.users_select(APPROVER_ACTION_ID, "Select an approver");
        })
        .input(TEXT_BLOCK_ID, "Approval Text", |input| {
            input.multiline_text(TEXT_ACTION_ID, "Enter your request for approval");
        })
        .build()
}

pub fn approval_request_attachment() -> Attachment {
    Attachment {
        text: "Do you approve?".to_owned(),
        fallback: "You are unable to approve/reject the request".to_owned(),
        callback_id: APPROVAL_REQUEST_CALLBACK_ID.to_owned(),
        color: "#3AA3E3".to_owned(),
        attachment_type: "default".to_owned(),
        actions: Decision::ALL.into_iter().map(AttachmentButton::for_decision).collect(),
    }
}

/// Approver DM: channel is the approver's user id, which Slack resolves to the DM.
pub fn approval_request_message(request: &ApprovalRequest) -> OutgoingMessage {
    OutgoingMessage::text(request.approver.as_str(), request.notification_text())
        .attachment(approval_request_attachment())
}
