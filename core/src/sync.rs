//! Blocking bridge for callers that cannot `.await`.
//!
//! Use only when there is no async caller to propagate to. The work runs on
//! a dedicated multi-thread runtime, so blocking the calling thread cannot
//! starve the executor the work needs, even when the caller is itself a
//! runtime worker.

use std::future::Future;
use std::panic;
use std::sync::OnceLock;

use tokio::runtime::{Builder, Runtime};

use crate::error::BridgeError;

static RUNTIME: OnceLock<Result<Runtime, String>> = OnceLock::new();

fn runtime() -> Result<&'static Runtime, BridgeError> {
    RUNTIME
        .get_or_init(|| {
            Builder::new_multi_thread()
                .thread_name("service-infra-sync")
                .enable_all()
                .build()
                .map_err(|error| error.to_string())
        })
        .as_ref()
        .map_err(|error| BridgeError::Runtime(error.clone()))
}

/// Runs `work` to completion and blocks until it finishes.
///
/// A panic inside the work is resumed on the calling thread.
pub fn run_sync<F, Fut>(work: F) -> Result<Fut::Output, BridgeError>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    let handle = runtime()?.spawn(async move { work().await });
    match futures::executor::block_on(handle) {
        Ok(output) => Ok(output),
        Err(error) if error.is_panic() => panic::resume_unwind(error.into_panic()),
        Err(_) => Err(BridgeError::Cancelled),
    }
}
