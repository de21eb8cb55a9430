//! Event-driven alarm remediation
//!
//! An alarm transition into the firing state triggers one remediation run:
//! diagnostics are gathered from the affected resource, a text advisor
//! proposes advice and an action plan, safe actions are executed remotely
//! and the outcome is reported once to chat and once to the broadcast
//! channel the alarm arrived on.

pub mod actions;
pub mod advisory;
pub mod api;
pub mod collaborators;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod notify;
pub mod orchestrator;
pub mod retry;
pub mod util;

pub use collaborators::Collaborators;
pub use config::{Config, Settings};
pub use event::{Classification, InboundNotification, classify};
pub use orchestrator::{HandlerResponse, Remediator};
