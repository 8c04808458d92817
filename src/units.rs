use crate::polling::{self, ChangePredicate, Scope, UnitChanges, UnitFilter};
use crate::{Error, Result, SubscriptionSet, UnitStatus, unit_status_differs};

use std::sync::Arc;
use std::time::Duration;

use futures_channel::mpsc;

#[derive(Clone, Debug)]
/// Unit listing and polling subscriptions.
pub struct Units {
    inner: Arc<crate::Inner>,
}

impl Units {
    pub(crate) fn new(inner: Arc<crate::Inner>) -> Self {
        Self { inner }
    }

    /// List all units currently loaded by systemd.
    pub async fn list_units(&self) -> Result<Vec<UnitStatus>> {
        self.inner.transport.list_units().await
    }

    /// Poll every `interval` and receive units whose name, description, or load/active/sub
    /// state changed.
    ///
    /// Units that disappear are reported as `None`. The first message lists every unit.
    pub fn subscribe_units(
        &self,
        interval: Duration,
    ) -> Result<(mpsc::Receiver<UnitChanges>, mpsc::Receiver<Error>)> {
        self.subscribe_units_custom(interval, 0, Arc::new(unit_status_differs), None)
    }

    /// `subscribe_units` at `UnitLinkOptions::poll_interval`.
    pub fn watch(&self) -> Result<(mpsc::Receiver<UnitChanges>, mpsc::Receiver<Error>)> {
        self.subscribe_units(self.inner.opts.poll_interval)
    }

    /// Like `subscribe_units` with a channel buffer, a change predicate, and an optional name
    /// filter.
    ///
    /// Polling continues after listing errors (reported on the error channel) and stops once both
    /// receivers are dropped.
    pub fn subscribe_units_custom(
        &self,
        interval: Duration,
        buffer: usize,
        is_changed: ChangePredicate,
        filter: Option<UnitFilter>,
    ) -> Result<(mpsc::Receiver<UnitChanges>, mpsc::Receiver<Error>)> {
        let scope = match filter {
            Some(filter) => Scope::Filter(filter),
            None => Scope::All,
        };
        polling::subscribe(
            self.inner.transport.clone(),
            interval,
            buffer,
            is_changed,
            scope,
        )
    }

    /// Create an empty subscription set.
    pub fn new_subscription_set(&self) -> SubscriptionSet {
        SubscriptionSet::new(self.inner.clone())
    }
}
