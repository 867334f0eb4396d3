//! Core types for the signoff approval workflow.
//!
//! - **Configuration** (`config`) - layered file/env/override loading
//! - **Domain** (`domain`) - approval requests, decisions, and the mention codec
//!   that carries requester identity through the approver's message
//! - **Errors** (`errors`) - domain, application, and interface error taxonomy

pub mod config;
pub mod domain;
pub mod errors;

pub use domain::approval::{
    extract_first_mention, ApprovalDecision, ApprovalRequest, ApprovalStage, Decision, UserId,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
