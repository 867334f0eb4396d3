//! Slack integration for the signoff approval workflow.
//!
//! - **Web API** (`api`) - `views.open`, `chat.postMessage`, `response_url` replies
//! - **Block Kit** (`blocks`) - the approval modal and the approver's decision message
//! - **Slash Commands** (`commands`) - open the approval modal for a trigger
//! - **Events** (`events`) - form/JSON payload decoding and interaction dispatch
//! - **Approval** (`approval`) - modal submission and decision button handlers
//! - **Signatures** (`signature`) - `v0` request signing verification
//!
//! # Flow
//!
//! ```text
//! /command ──► views.open(approval_modal)
//! view_submission ──► chat.postMessage(approver, buttons)
//! button click ──► chat.postMessage(requester) ──► response_url(replace_original)
//! ```

pub mod api;
pub mod approval;
pub mod blocks;
pub mod commands;
pub mod events;
pub mod signature;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;
