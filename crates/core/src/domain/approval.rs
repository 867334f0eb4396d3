use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::errors::DomainError;

/// Slack user identifier (`U...` / `W...`). Also a valid DM channel target.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn mention(&self) -> String {
        format!("<@{}>", self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub const ALL: [Decision; 2] = [Decision::Approve, Decision::Reject];

    /// Button `name`/`value` carried in the interactive payload.
    pub fn value(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }

    /// Reads a clicked button value. Only `approve` approves; any other value rejects.
    pub fn from_button_value(value: &str) -> Self {
        if value == Self::Approve.value() {
            Self::Approve
        } else {
            Self::Reject
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Approve => "Approve",
            Self::Reject => "Reject",
        }
    }

    pub fn past_tense(&self) -> &'static str {
        match self {
            Self::Approve => "approved",
            Self::Reject => "rejected",
        }
    }
}

/// Lifecycle of one request. Nothing is stored; the stage only labels log events.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApprovalStage {
    ModalOpen,
    Pending,
    Resolved(Decision),
}

impl ApprovalStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModalOpen => "modal_open",
            Self::Pending => "pending",
            Self::Resolved(Decision::Approve) => "resolved_approved",
            Self::Resolved(Decision::Reject) => "resolved_rejected",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalRequest {
    pub requester: UserId,
    pub approver: UserId,
    pub text: String,
}

impl ApprovalRequest {
    pub fn new(requester: UserId, approver: UserId, text: impl Into<String>) -> Self {
        Self { requester, approver, text: text.into() }
    }

    /// Text of the approver DM. The requester mention must stay parseable by
    /// [`extract_first_mention`]; the action handler has no other way to find it.
    pub fn notification_text(&self) -> String {
        format!(
            "You have a new approval request from {}: {}",
            self.requester.mention(),
            self.text
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalDecision {
    pub approver: UserId,
    pub requester: UserId,
    pub decision: Decision,
}

impl ApprovalDecision {
    pub fn from_original_message(
        approver: UserId,
        decision: Decision,
        original_text: &str,
    ) -> Result<Self, DomainError> {
        let requester = extract_first_mention(original_text)?;
        Ok(Self { approver, requester, decision })
    }

    pub fn summary(&self) -> String {
        format!(
            "{} has {} the request from {}.",
            self.approver.mention(),
            self.decision.past_tense(),
            self.requester.mention()
        )
    }
}

fn mention_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| match Regex::new(r"<@([^>|\s]+)(?:\|[^>]*)?>") {
        Ok(pattern) => pattern,
        Err(error) => unreachable!("mention pattern is a valid literal: {error}"),
    })
}

/// Returns the first `<@ID>` (or `<@ID|label>`) user mention in `text`.
pub fn extract_first_mention(text: &str) -> Result<UserId, DomainError> {
    mention_pattern()
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|id| UserId::new(id.as_str()))
        .ok_or(DomainError::MissingRequesterMention)
}
