//! CLI utility functions

use miette::{IntoDiagnostic, Result};
use tokio::runtime::Runtime;

/// Runtime for commands that talk to the network.
pub fn network_runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("bunkatsu-net")
        .build()
        .into_diagnostic()
}
