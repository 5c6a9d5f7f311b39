//! # Module: adapters
//!
//! Thin front ends that turn agent events into outcomes and hand them to the
//! store. None of them classify or score anything themselves.
//!
//! ## Sub-modules
//! - [`lifecycle`]: typed hooks for task, session, model, cron and sub-agent events
//! - [`webhook`]: minimal HTTP/1.1 endpoint for agents that cannot link the crate
//!
//! The file-drop adapter lives in [`crate::inbox`].

pub mod lifecycle;
pub mod webhook;

pub use lifecycle::LifecycleAdapter;
