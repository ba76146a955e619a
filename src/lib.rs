//! Photo-to-inventory enrichment pipeline.
//!
//! This library provides the core of the inventory-enrich system: for each
//! candidate object proposed by an upstream vision classification step it
//! runs an independent `locate → crop → enhance → persist` task, streams
//! per-object progress through a status store, and ships the client-side
//! poller and reconciliation queue that turn out-of-order completions into
//! a stable review experience.

pub mod app_state;
pub mod client;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
