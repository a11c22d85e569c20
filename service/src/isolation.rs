//! Panic isolation for plugin and strategy calls
//!
//! A panicking parser or relationship strategy is converted into an ordinary
//! failure for its own unit of work; the rest of the run continues.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Run `f`, converting a panic into `Err(message)`
///
/// # Errors
///
/// Returns the panic message if `f` panics
pub fn run_isolated<F, T>(operation: &str, f: F) -> Result<T, String>
where
    F: FnOnce() -> T,
{
    catch_unwind(AssertUnwindSafe(f)).map_err(|panic| {
        let message = panic_message(panic.as_ref());
        tracing::warn!(operation, panic = %message, "isolated panic");
        format!("'{operation}' panicked: {message}")
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
