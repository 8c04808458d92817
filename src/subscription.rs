use crate::polling::{self, Scope, UnitChanges};
use crate::registry::SetId;
use crate::{Error, PropertiesUpdate, Result, unit_status_differs, util};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_channel::mpsc;

/// A caller-managed group of units whose changes are delivered together.
///
/// Membership holds a reference on each unit's `PropertiesChanged` match rule until the set is
/// detached (its properties subscription is canceled, or `close` is called). Dropping the set
/// without detaching it keeps those references; release them explicitly.
#[derive(Debug)]
pub struct SubscriptionSet {
    id: SetId,
    inner: Arc<crate::Inner>,
}

impl SubscriptionSet {
    pub(crate) fn new(inner: Arc<crate::Inner>) -> Self {
        let id = inner.registry.next_id();
        Self { id, inner }
    }

    /// Add a unit. The first reference to a unit registers its match rule with the bus.
    ///
    /// `unit` is canonicalized (e.g. `"nginx"` becomes `"nginx.service"`).
    pub async fn add(&self, unit: &str) -> Result<()> {
        let unit = util::canonicalize_unit_name(unit)?;
        let _added = self.inner.registry.set_add(self.id, &unit).await?;
        #[cfg(feature = "tracing")]
        tracing::debug!(set = self.id, %unit, added = _added, "subscription set add");
        Ok(())
    }

    /// Remove a unit. The match rule is unregistered once nothing else references the unit.
    pub async fn remove(&self, unit: &str) -> Result<()> {
        let unit = util::canonicalize_unit_name(unit)?;
        let _removed = self.inner.registry.set_remove(self.id, &unit).await?;
        #[cfg(feature = "tracing")]
        tracing::debug!(set = self.id, %unit, removed = _removed, "subscription set remove");
        Ok(())
    }

    pub async fn contains(&self, unit: &str) -> bool {
        match util::canonicalize_unit_name(unit) {
            Ok(unit) => self.inner.registry.set_contains(self.id, &unit).await,
            Err(_) => false,
        }
    }

    /// Current members, sorted.
    pub async fn units(&self) -> Vec<String> {
        let mut units: Vec<String> = self
            .inner
            .registry
            .set_members(self.id)
            .await
            .into_iter()
            .collect();
        units.sort();
        units
    }

    /// Deliver `PropertiesChanged`/`UnitNew` updates for the set's members on `updates`.
    ///
    /// Undecodable signals are reported on `errors`. When `cancel` resolves, both channels are
    /// closed and the set is detached, releasing match rules no longer referenced elsewhere.
    /// Calling this again replaces (and closes) the previous channels; the previous `cancel` then
    /// has no effect. Channels should be buffered or drained promptly: a full channel stalls
    /// signal dispatch.
    pub async fn set_properties_subscriber<C>(
        &self,
        cancel: C,
        updates: mpsc::Sender<PropertiesUpdate>,
        errors: mpsc::Sender<Error>,
    ) -> Result<()>
    where
        C: Future<Output = ()> + Send + 'static,
    {
        let registry = self.inner.registry.clone();
        let sink = registry.set_attach_sink(self.id, updates, errors).await?;

        let id = self.id;
        let watcher = {
            let registry = registry.clone();
            async move {
                cancel.await;
                if let Err(_e) = registry.set_detach(id, Some(sink), false).await {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(set = id, error = %_e, "subscription set cleanup");
                }
            }
        };
        if let Err(e) = crate::runtime::spawn("unitlink-cancel", watcher) {
            registry.set_detach(id, Some(sink), false).await?;
            return Err(e);
        }
        Ok(())
    }

    /// Poll `ListUnits` every `interval`, reporting changes to the set's members only.
    ///
    /// Membership is re-read on every tick.
    pub fn subscribe(
        &self,
        interval: Duration,
    ) -> Result<(mpsc::Receiver<UnitChanges>, mpsc::Receiver<Error>)> {
        polling::subscribe(
            self.inner.transport.clone(),
            interval,
            0,
            Arc::new(unit_status_differs),
            Scope::Set(self.inner.registry.clone(), self.id),
        )
    }

    /// Detach the set and forget its members.
    pub async fn close(self) -> Result<()> {
        self.inner.registry.set_detach(self.id, None, true).await
    }
}

/// Push-model subscriptions outside of subscription sets.
#[derive(Clone, Debug)]
pub struct PropertiesSubscriber {
    inner: Arc<crate::Inner>,
}

impl PropertiesSubscriber {
    pub(crate) fn new(inner: Arc<crate::Inner>) -> Self {
        Self { inner }
    }

    /// Deliver updates for a single unit until `cancel` resolves.
    ///
    /// Counts as one reference on the unit's match rule, independent of any subscription set.
    pub async fn subscribe_unit<C>(
        &self,
        unit: &str,
        cancel: C,
        updates: mpsc::Sender<PropertiesUpdate>,
    ) -> Result<()>
    where
        C: Future<Output = ()> + Send + 'static,
    {
        let unit = util::canonicalize_unit_name(unit)?;
        let registry = self.inner.registry.clone();
        let id = registry.next_id();
        registry.direct_add(id, &unit, updates).await?;

        let watcher = {
            let registry = registry.clone();
            async move {
                cancel.await;
                if let Err(_e) = registry.direct_remove(id).await {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(subscription = id, error = %_e, "unit subscription cleanup");
                }
            }
        };
        if let Err(e) = crate::runtime::spawn("unitlink-cancel", watcher) {
            registry.direct_remove(id).await?;
            return Err(e);
        }
        Ok(())
    }

    /// Number of references (set memberships plus direct subscriptions) on a unit's match rule.
    pub async fn refcount(&self, unit: &str) -> usize {
        match util::canonicalize_unit_name(unit) {
            Ok(unit) => self.inner.registry.refcount(&unit).await,
            Err(_) => 0,
        }
    }

    /// Whether a `PropertiesChanged` match rule is currently registered for the unit.
    pub async fn is_watched(&self, unit: &str) -> bool {
        self.refcount(unit).await > 0
    }
}
