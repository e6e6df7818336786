//! Use cases: starting payments and reconciling their outcome.
//!
//! Both services hold the order store and provider registry behind `Arc`s and
//! are cheap to clone into request handlers.

pub mod orchestrator;
pub mod reconciliation;
