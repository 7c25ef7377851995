//! firehose-daemon library.
//!
//! Exposes the daemon internals for integration testing; production use is
//! the `firehose-daemon` binary.

pub mod cli;
pub mod logging;
pub mod metrics_server;
pub mod orchestrator;
pub mod source;
