//! Logging of failed results at the point they are propagated.

use std::fmt::Display;
use std::panic::Location;

use tracing::error;

pub trait ResultExt<T, E> {
    /// On `Err`, emit an error event carrying `context` and the caller's
    /// location. The result itself is returned untouched.
    fn log_failure(self, context: impl Display) -> Result<T, E>;
}

impl<T, E: Display> ResultExt<T, E> for Result<T, E> {
    #[track_caller]
    fn log_failure(self, context: impl Display) -> Result<T, E> {
        if let Err(e) = &self {
            let location = Location::caller();
            error!(
                target: "sequence_engine",
                error = %e,
                %location,
                %context,
                "Engine operation failed"
            );
        }
        self
    }
}
