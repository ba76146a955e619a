//! Client-side consumption of the enrichment pipeline: a cancellable
//! status poller and the reconciliation queue that turns out-of-order
//! completions into a stable review sequence.

pub mod poller;
pub mod review_queue;
