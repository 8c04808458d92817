//! unitlink is a Rust SDK for driving systemd over D-Bus: submit unit jobs and wait for their
//! completion signal, and follow unit state either by polling or by subscribing to property
//! change signals.
//!
//! Every job call (`StartUnit`, `RestartUnit`, ...) returns the job object path systemd queued.
//! A background dispatcher correlates the later `JobRemoved` broadcast with that path and delivers
//! the job's result to the caller exactly once.
//!
//! Runtime is Linux-only (systemd + system bus required). The engine itself only talks to a
//! `Transport`, so it can be driven by an in-memory implementation in tests.
//!
//! ## Quick start
//! ```no_run
//! use unitlink::{UnitLink, UnitStartMode};
//!
//! async fn restart_nginx() -> Result<(), unitlink::Error> {
//!     let link = UnitLink::connect_system().await?;
//!     let outcome = link.jobs().restart("nginx", UnitStartMode::Replace).await?;
//!     println!("{outcome}");
//!     Ok(())
//! }
//! ```
//!
//! ## Unit name rules
//! - You can pass either a full unit name (e.g. `"nginx.service"`) or a shorthand (e.g. `"nginx"`).
//! - Shorthand names are canonicalized to `"<name>.service"`.
//! - Names containing path separators or control characters are rejected as `Error::InvalidInput`.
//!
//! ## Subscriptions
//! - `Units::subscribe_units` polls `ListUnits` and diffs consecutive snapshots.
//! - `SubscriptionSet` groups units whose `PropertiesChanged` signals are delivered together. A
//!   match rule for a unit is registered while at least one set or direct subscription holds it.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::dbg_macro)]

#[cfg(all(feature = "rt-async-io", feature = "rt-tokio"))]
compile_error!("features `rt-async-io` and `rt-tokio` are mutually exclusive; enable exactly one.");

#[cfg(not(any(feature = "rt-async-io", feature = "rt-tokio")))]
compile_error!(
    "missing runtime feature: enable one of `rt-async-io` or `rt-tokio` (default enables `rt-async-io`)."
);

#[cfg(feature = "blocking")]
mod blocking_api;
mod bus;
mod dispatch;
mod error;
mod jobs;
mod options;
mod polling;
mod registry;
mod runtime;
mod subscription;
mod transport;
mod types;
mod units;
mod util;

pub use crate::types::job::{JobOutput, JobPath, JobRequest, JobResult};
pub use crate::types::properties::{Properties, PropertiesUpdate};
pub use crate::types::unit::{
    ActiveState, LoadState, UnitStartMode, UnitStatus, unit_status_differs,
};

pub use crate::bus::ZbusTransport;
pub use crate::error::{Error, Result};
pub use crate::options::UnitLinkOptions;
pub use crate::polling::{ChangePredicate, UnitChanges, UnitFilter, diff_snapshots};
pub use crate::runtime::BoxFuture;
pub use crate::transport::{MatchRule, Signal, SignalStream, Transport};

#[cfg(feature = "blocking")]
pub use crate::blocking_api::{BlockingJobs, BlockingUnitLink};

pub use crate::jobs::Jobs;
pub use crate::subscription::{PropertiesSubscriber, SubscriptionSet};
pub use crate::units::Units;

use std::fmt;
use std::sync::Arc;

/// Primary entrypoint: one bus connection, one job dispatcher, one subscriber registry.
#[derive(Clone, Debug)]
pub struct UnitLink {
    inner: Arc<Inner>,
}

struct Inner {
    opts: UnitLinkOptions,
    transport: Arc<dyn Transport>,
    dispatcher: dispatch::Dispatcher,
    registry: Arc<registry::Registry>,
}

impl fmt::Debug for Inner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inner")
            .field("opts", &self.opts)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl UnitLink {
    /// Connect to the system D-Bus.
    pub async fn connect_system() -> Result<Self> {
        Self::connect_system_with(UnitLinkOptions::default()).await
    }

    /// Connect to the system D-Bus with custom options (timeouts, buffers).
    pub async fn connect_system_with(opts: UnitLinkOptions) -> Result<Self> {
        let transport = ZbusTransport::connect_system(&opts).await?;
        Self::with_transport(Arc::new(transport), opts).await
    }

    /// Connect to the session D-Bus (the user's systemd instance).
    pub async fn connect_session_with(opts: UnitLinkOptions) -> Result<Self> {
        let transport = ZbusTransport::connect_session(&opts).await?;
        Self::with_transport(Arc::new(transport), opts).await
    }

    /// Build the engine over an existing transport.
    ///
    /// Opens the transport's signal stream, registers the manager `JobRemoved` and `UnitNew`
    /// match rules, and starts the dispatcher.
    pub async fn with_transport(
        transport: Arc<dyn Transport>,
        opts: UnitLinkOptions,
    ) -> Result<Self> {
        let signals = transport.signals().await?;
        for member in ["JobRemoved", "UnitNew"] {
            transport
                .add_match(&MatchRule::manager_signal(member))
                .await?;
        }

        let registry = Arc::new(registry::Registry::new(transport.clone()));
        let dispatcher = dispatch::Dispatcher::start(
            transport.clone(),
            registry.clone(),
            signals,
            opts.request_buffer,
        )?;

        #[cfg(feature = "tracing")]
        tracing::debug!(?opts, "unitlink engine started");

        Ok(Self {
            inner: Arc::new(Inner {
                opts,
                transport,
                dispatcher,
                registry,
            }),
        })
    }

    /// Access job submission APIs.
    pub fn jobs(&self) -> Jobs {
        Jobs::new(self.inner.clone())
    }

    /// Access unit listing and polling APIs.
    pub fn units(&self) -> Units {
        Units::new(self.inner.clone())
    }

    /// Access per-unit property change subscriptions.
    pub fn properties(&self) -> PropertiesSubscriber {
        PropertiesSubscriber::new(self.inner.clone())
    }

    /// Create an empty subscription set.
    pub fn new_subscription_set(&self) -> SubscriptionSet {
        SubscriptionSet::new(self.inner.clone())
    }
}
