//! Pull-model subscriptions: periodic `ListUnits` with client-side diffing.
//!
//! Each subscription owns one background worker. A diff is relative to the previous successful
//! listing only, so several transitions within one interval surface as a single change. Listing
//! failures go to the error channel and polling carries on at the next tick.

use crate::registry::{Registry, SetId};
use crate::transport::Transport;
use crate::{Error, Result, UnitStatus};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_channel::mpsc;
use futures_util::SinkExt;

/// Units that changed since the previous tick; `None` marks a unit that disappeared.
pub type UnitChanges = HashMap<String, Option<UnitStatus>>;

/// Returns true when the second status should be reported as a change from the first.
pub type ChangePredicate = Arc<dyn Fn(&UnitStatus, &UnitStatus) -> bool + Send + Sync>;

/// Returns true for unit names the subscription should track.
pub type UnitFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

pub(crate) enum Scope {
    All,
    Filter(UnitFilter),
    Set(Arc<Registry>, SetId),
}

/// Compare two snapshots.
///
/// Units new in `current`, or present in both with `is_changed(old, new)` true, map to
/// `Some(new)`. Units missing from `current` map to `None`.
pub fn diff_snapshots(
    previous: &HashMap<String, UnitStatus>,
    current: &HashMap<String, UnitStatus>,
    is_changed: &dyn Fn(&UnitStatus, &UnitStatus) -> bool,
) -> UnitChanges {
    let mut changed = UnitChanges::new();
    for (name, status) in current {
        let report = match previous.get(name) {
            Some(old) => is_changed(old, status),
            None => true,
        };
        if report {
            changed.insert(name.clone(), Some(status.clone()));
        }
    }
    for name in previous.keys() {
        if !current.contains_key(name) {
            changed.insert(name.clone(), None);
        }
    }
    changed
}

pub(crate) fn subscribe(
    transport: Arc<dyn Transport>,
    interval: Duration,
    buffer: usize,
    is_changed: ChangePredicate,
    scope: Scope,
) -> Result<(mpsc::Receiver<UnitChanges>, mpsc::Receiver<Error>)> {
    if interval.is_zero() {
        return Err(Error::invalid_input("interval must be > 0"));
    }
    let (changes_tx, changes_rx) = mpsc::channel(buffer);
    let (errors_tx, errors_rx) = mpsc::channel(buffer);

    #[cfg(feature = "tracing")]
    tracing::debug!(?interval, buffer, "polling subscription start");

    crate::runtime::spawn(
        "unitlink-poll",
        poll_loop(transport, interval, is_changed, scope, changes_tx, errors_tx),
    )?;
    Ok((changes_rx, errors_rx))
}

/// Runs until both receivers are dropped.
async fn poll_loop(
    transport: Arc<dyn Transport>,
    interval: Duration,
    is_changed: ChangePredicate,
    scope: Scope,
    mut changes: mpsc::Sender<UnitChanges>,
    mut errors: mpsc::Sender<Error>,
) {
    let mut previous: HashMap<String, UnitStatus> = HashMap::new();

    while !(changes.is_closed() && errors.is_closed()) {
        let tick_started = Instant::now();

        match snapshot(transport.as_ref(), &scope).await {
            Ok(current) => {
                let changed = diff_snapshots(&previous, &current, is_changed.as_ref());
                previous = current;
                // A dropped receiver is checked at the top of the loop.
                let _ = changes.send(changed).await;
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::debug!(error = %e, "polling list_units failed");
                let _ = errors.send(e).await;
            }
        }

        crate::runtime::sleep(interval.saturating_sub(tick_started.elapsed())).await;
    }

    #[cfg(feature = "tracing")]
    tracing::debug!("polling subscription stopped");
}

async fn snapshot(transport: &dyn Transport, scope: &Scope) -> Result<HashMap<String, UnitStatus>> {
    let units = transport.list_units().await?;
    let members = match scope {
        Scope::Set(registry, id) => Some(registry.set_members(*id).await),
        Scope::All | Scope::Filter(_) => None,
    };

    Ok(units
        .into_iter()
        .filter(|u| match scope {
            Scope::All => true,
            Scope::Filter(keep) => keep(u.name.as_str()),
            Scope::Set(..) => members.as_ref().is_some_and(|m| m.contains(&u.name)),
        })
        .map(|u| (u.name.clone(), u))
        .collect())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::{ActiveState, LoadState, unit_status_differs};

    fn snapshot_of(units: &[(&str, ActiveState)]) -> HashMap<String, UnitStatus> {
        units
            .iter()
            .map(|(name, active)| {
                (
                    name.to_string(),
                    UnitStatus::new(*name, LoadState::Loaded, active.clone()),
                )
            })
            .collect()
    }

    #[test]
    fn first_tick_reports_everything() {
        let current = snapshot_of(&[
            ("a.service", ActiveState::Active),
            ("b.service", ActiveState::Inactive),
        ]);
        let changed = diff_snapshots(&HashMap::new(), &current, &unit_status_differs);
        assert_eq!(changed.len(), 2);
        assert!(changed.values().all(Option::is_some));
    }

    #[test]
    fn vanished_unit_maps_to_none() {
        let previous = snapshot_of(&[("u1.service", ActiveState::Active)]);
        let changed = diff_snapshots(&previous, &HashMap::new(), &unit_status_differs);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed.get("u1.service"), Some(&None));
    }

    #[test]
    fn predicate_decides_what_counts_as_changed() {
        let previous = snapshot_of(&[
            ("a.service", ActiveState::Active),
            ("b.service", ActiveState::Active),
        ]);
        let current = snapshot_of(&[
            ("a.service", ActiveState::Active),
            ("b.service", ActiveState::Failed),
        ]);

        let changed = diff_snapshots(&previous, &current, &unit_status_differs);
        assert_eq!(changed.len(), 1);
        let b = changed
            .get("b.service")
            .and_then(Option::as_ref)
            .expect("b changed");
        assert_eq!(b.active_state, ActiveState::Failed);

        let never = diff_snapshots(&previous, &current, &|_, _| false);
        assert!(never.is_empty());

        let always = diff_snapshots(&previous, &current, &|_, _| true);
        assert_eq!(always.len(), 2);
    }
}
