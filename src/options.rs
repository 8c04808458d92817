use std::time::Duration;

/// Configuration options for `UnitLink`.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct UnitLinkOptions {
    /// D-Bus method call timeout.
    pub dbus_call_timeout: Duration,

    /// Capacity of the queue between callers and the job dispatcher.
    pub request_buffer: usize,

    /// Capacity of the inbound signal queue kept by the D-Bus transport.
    pub signal_buffer: usize,

    /// Polling interval used by `Units::watch`.
    pub poll_interval: Duration,
}

impl Default for UnitLinkOptions {
    fn default() -> Self {
        Self {
            dbus_call_timeout: Duration::from_secs(5),
            request_buffer: 64,
            signal_buffer: 1000,
            poll_interval: Duration::from_secs(1),
        }
    }
}
