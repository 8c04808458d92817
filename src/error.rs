use std::time::Duration;

/// Crate-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Error returned by unitlink APIs.
///
/// This error model is designed to be:
/// - **Classifiable** (callers can branch on variants),
/// - **Diagnosable** (includes context like `unit`, `action`, `backend`),
/// - **Cloneable** (the same decode failure can be fanned out to every subscriber).
#[derive(Clone, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Input validation failure (e.g. invalid unit name, unsupported argument list).
    #[error("invalid input: {context}")]
    InvalidInput { context: String },

    /// The current process is not allowed to perform an action (D-Bus policy, PolicyKit).
    #[error("permission denied for {action}: {detail}")]
    PermissionDenied {
        action: &'static str,
        detail: String,
    },

    /// The requested unit does not exist (best-effort mapping from D-Bus error names).
    #[error("unit not found: {unit}")]
    UnitNotFound { unit: String },

    /// Timed out while waiting for a submitted job to complete.
    ///
    /// The job itself is not canceled; a late completion signal is still consumed.
    #[error("job timeout for {unit}: {timeout:?}")]
    JobTimeout { unit: String, timeout: Duration },

    /// Timed out while performing a D-Bus call.
    #[error("timeout for {action}: {timeout:?}")]
    Timeout {
        action: &'static str,
        timeout: Duration,
    },

    /// A backend is unavailable in the current environment (missing bus, no runtime, etc).
    #[error("backend unavailable ({backend}): {detail}")]
    BackendUnavailable {
        backend: &'static str,
        detail: String,
    },

    /// Raw D-Bus error that did not match a more specific classification.
    #[error("dbus error {name}: {message}")]
    DbusError { name: String, message: String },

    /// Generic I/O or runtime error with context.
    #[error("io error: {context}")]
    IoError { context: String },

    /// A broadcast signal did not have the body shape its name promises.
    #[error("signal decode error for {signal}: {detail}")]
    SignalDecode { signal: String, detail: String },

    /// The dispatcher stopped (signal stream ended or the engine was dropped) before a result
    /// could be delivered.
    #[error("engine disconnected: {context}")]
    Disconnected { context: &'static str },
}

impl Error {
    pub(crate) fn invalid_input(context: impl Into<String>) -> Self {
        Self::InvalidInput {
            context: context.into(),
        }
    }

    pub(crate) fn signal_decode(signal: impl Into<String>, detail: impl ToString) -> Self {
        Self::SignalDecode {
            signal: signal.into(),
            detail: detail.to_string(),
        }
    }
}
