//! Bounded collaborator calls.
//!
//! Every external call in the pipeline goes through [`bounded`], which
//! applies a timeout and converts a panic inside the collaborator's future
//! into a [`CallError`]. Callers then decide how to degrade:
//!
//! ```text
//! bounded(call, limit, fut)
//!   ├─ fut resolves in time      → its own Result
//!   ├─ limit elapses first       → CallError::Timeout
//!   └─ fut panics while polled   → CallError::Panicked
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;

use crate::errors::CallError;

/// Run `fut` with a time bound, folding timeouts and panics into `CallError`.
pub async fn bounded<T, F>(call: &str, limit: Duration, fut: F) -> Result<T, CallError>
where
    F: Future<Output = Result<T, CallError>>,
{
    let guarded = AssertUnwindSafe(fut).catch_unwind();
    match tokio::time::timeout(limit, guarded).await {
        Ok(Ok(result)) => result,
        Ok(Err(payload)) => Err(CallError::Panicked {
            call: call.to_string(),
            message: panic_message(payload.as_ref()),
        }),
        Err(_) => Err(CallError::Timeout {
            call: call.to_string(),
            after: limit,
        }),
    }
}

/// Best-effort extraction of a panic payload's message.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
