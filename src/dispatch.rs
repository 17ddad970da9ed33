//! Delivering dispatch events to the caller's handler.
//!
//! A caller-provided callback is treated the same way the teacher treats its
//! internal event broadcast: a bug in consumer code must never be allowed to
//! bring down the connection loop that feeds it.

use crate::model::DispatchEvent;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// A handler invoked once per dispatch event, in the order received.
pub type Callback = Arc<dyn Fn(DispatchEvent) + Send + Sync>;

/// Deliver one event to `callback`, isolating the connection loop from a
/// panic inside it.
///
/// A panicking callback is logged and otherwise ignored: the event is
/// considered delivered (the alternative — retrying or killing the
/// connection over a caller bug — is worse for every caller that isn't the
/// one with the bug).
pub fn emit(callback: &Callback, event: DispatchEvent) {
    let name = event.name.clone();

    let result = catch_unwind(AssertUnwindSafe(|| callback(event)));

    if result.is_err() {
        tracing::error!(event = %name, "dispatch callback panicked");
    }
}
