//! This module contains the core logic of the gatebridge request adapter.
//!
//! It turns serverless invocation envelopes into requests, runs each one in
//! an isolated execution context with lifecycle events around dispatch, and
//! renders the outcome in gateway format.

pub mod config;
pub mod core;
pub mod handler;
pub mod listener;
pub mod logging;
pub mod orchestration;
pub mod utils;
