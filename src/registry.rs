//! Shared subscriber state: subscription-set membership, output channels, and match-rule
//! reference counts.
//!
//! Every mutation happens under one async lock that is held across `add_match`/`remove_match`,
//! so "refcount(u) > 0" and "the rule for u is registered" change together.

use crate::transport::{MatchRule, Transport};
use crate::{Error, PropertiesUpdate, Result};

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_channel::mpsc;
use futures_util::SinkExt;
use futures_util::lock::Mutex;

pub(crate) type SetId = u64;
pub(crate) type DirectId = u64;
/// Identifies one `set_attach_sink` call, so a stale cancellation cannot detach a newer sink.
pub(crate) type SinkId = u64;

pub(crate) struct Registry {
    transport: Arc<dyn Transport>,
    state: Mutex<RegistryState>,
    next_id: AtomicU64,
}

#[derive(Default)]
struct RegistryState {
    sets: HashMap<SetId, SetEntry>,
    direct: HashMap<DirectId, DirectEntry>,
    refcounts: HashMap<String, usize>,
}

struct SetEntry {
    members: HashSet<String>,
    /// Whether the members currently hold references. Cleared on cancellation or close.
    attached: bool,
    sink: Option<SetSink>,
}

impl Default for SetEntry {
    fn default() -> Self {
        Self {
            members: HashSet::new(),
            attached: true,
            sink: None,
        }
    }
}

struct SetSink {
    id: SinkId,
    updates: mpsc::Sender<PropertiesUpdate>,
    errors: mpsc::Sender<Error>,
}

impl SetSink {
    fn close(mut self) {
        self.updates.close_channel();
        self.errors.close_channel();
    }
}

struct DirectEntry {
    unit: String,
    updates: mpsc::Sender<PropertiesUpdate>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}

impl Registry {
    pub(crate) fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            state: Mutex::new(RegistryState::default()),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Add `unit` to set `id`. Returns false if it was already a member.
    pub(crate) async fn set_add(&self, id: SetId, unit: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let entry = state.sets.entry(id).or_default();
        if entry.members.contains(unit) {
            return Ok(false);
        }
        if entry.attached {
            self.retain(&mut state, unit).await?;
        }
        state
            .sets
            .entry(id)
            .or_default()
            .members
            .insert(unit.to_string());
        Ok(true)
    }

    /// Remove `unit` from set `id`. Returns false if it was not a member.
    pub(crate) async fn set_remove(&self, id: SetId, unit: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(entry) = state.sets.get_mut(&id) else {
            return Ok(false);
        };
        if !entry.members.remove(unit) {
            return Ok(false);
        }
        if entry.attached {
            self.release(&mut state, unit).await?;
        }
        Ok(true)
    }

    pub(crate) async fn set_contains(&self, id: SetId, unit: &str) -> bool {
        let state = self.state.lock().await;
        state
            .sets
            .get(&id)
            .is_some_and(|entry| entry.members.contains(unit))
    }

    pub(crate) async fn set_members(&self, id: SetId) -> HashSet<String> {
        let state = self.state.lock().await;
        state
            .sets
            .get(&id)
            .map(|entry| entry.members.clone())
            .unwrap_or_default()
    }

    /// Register output channels for set `id`, replacing (and closing) any previous pair.
    ///
    /// A detached set is re-attached: its members take their references again. If one of them
    /// cannot be retained, those already retained are released and the set stays detached.
    pub(crate) async fn set_attach_sink(
        &self,
        id: SetId,
        updates: mpsc::Sender<PropertiesUpdate>,
        errors: mpsc::Sender<Error>,
    ) -> Result<SinkId> {
        let mut state = self.state.lock().await;
        let entry = state.sets.entry(id).or_default();
        if let Some(previous) = entry.sink.take() {
            previous.close();
        }
        if !entry.attached {
            let members: Vec<String> = entry.members.iter().cloned().collect();
            for (retained, unit) in members.iter().enumerate() {
                if let Err(e) = self.retain(&mut state, unit).await {
                    for unit in &members[..retained] {
                        if let Err(_release_err) = self.release(&mut state, unit).await {
                            #[cfg(feature = "tracing")]
                            tracing::warn!(set = id, %unit, error = %_release_err, "reattach rollback");
                        }
                    }
                    return Err(e);
                }
            }
        }
        let sink = self.next_id();
        let entry = state.sets.entry(id).or_default();
        entry.attached = true;
        entry.sink = Some(SetSink {
            id: sink,
            updates,
            errors,
        });
        Ok(sink)
    }

    /// Close set `id`'s channels and release its members' references. Idempotent.
    ///
    /// With `sink`, nothing happens unless that sink is still the one installed. With `forget`,
    /// local membership is dropped too.
    pub(crate) async fn set_detach(
        &self,
        id: SetId,
        sink: Option<SinkId>,
        forget: bool,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(entry) = state.sets.get_mut(&id) else {
            return Ok(());
        };
        if let Some(expected) = sink
            && entry.sink.as_ref().map(|s| s.id) != Some(expected)
        {
            return Ok(());
        }
        if let Some(sink) = entry.sink.take() {
            sink.close();
        }
        let members: Vec<String> = if entry.attached {
            entry.attached = false;
            entry.members.iter().cloned().collect()
        } else {
            Vec::new()
        };
        if forget {
            state.sets.remove(&id);
        }

        let mut first_err = None;
        for unit in &members {
            if let Err(e) = self.release(&mut state, unit).await {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub(crate) async fn direct_add(
        &self,
        id: DirectId,
        unit: &str,
        updates: mpsc::Sender<PropertiesUpdate>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        self.retain(&mut state, unit).await?;
        state.direct.insert(
            id,
            DirectEntry {
                unit: unit.to_string(),
                updates,
            },
        );
        Ok(())
    }

    pub(crate) async fn direct_remove(&self, id: DirectId) -> Result<()> {
        let mut state = self.state.lock().await;
        let Some(mut entry) = state.direct.remove(&id) else {
            return Ok(());
        };
        entry.updates.close_channel();
        self.release(&mut state, &entry.unit).await
    }

    pub(crate) async fn refcount(&self, unit: &str) -> usize {
        let state = self.state.lock().await;
        state.refcounts.get(unit).copied().unwrap_or(0)
    }

    /// Fan `update` out to every registered set containing the unit and every direct subscriber
    /// of it. The lock is released before any send is awaited.
    pub(crate) async fn publish(&self, update: PropertiesUpdate) {
        let targets: Vec<mpsc::Sender<PropertiesUpdate>> = {
            let state = self.state.lock().await;
            let sets = state.sets.values().filter_map(|entry| match &entry.sink {
                Some(sink) if entry.members.contains(&update.unit) => Some(sink.updates.clone()),
                _ => None,
            });
            let direct = state
                .direct
                .values()
                .filter(|entry| entry.unit == update.unit)
                .map(|entry| entry.updates.clone());
            sets.chain(direct).collect()
        };

        #[cfg(feature = "tracing")]
        tracing::trace!(unit = %update.unit, targets = targets.len(), "properties update");

        for mut tx in targets {
            // A closed channel belongs to a subscription being torn down.
            let _ = tx.send(update.clone()).await;
        }
    }

    /// Report an error to every registered set.
    pub(crate) async fn publish_error(&self, err: Error) {
        let targets: Vec<mpsc::Sender<Error>> = {
            let state = self.state.lock().await;
            state
                .sets
                .values()
                .filter_map(|entry| entry.sink.as_ref().map(|sink| sink.errors.clone()))
                .collect()
        };
        for mut tx in targets {
            let _ = tx.send(err.clone()).await;
        }
    }

    async fn retain(&self, state: &mut RegistryState, unit: &str) -> Result<()> {
        let count = state.refcounts.get(unit).copied().unwrap_or(0);
        if count == 0 {
            let rule = MatchRule::unit_properties_changed(unit);
            self.transport.add_match(&rule).await?;
            #[cfg(feature = "tracing")]
            tracing::debug!(%unit, %rule, "match rule added");
        }
        state.refcounts.insert(unit.to_string(), count + 1);
        Ok(())
    }

    async fn release(&self, state: &mut RegistryState, unit: &str) -> Result<()> {
        match state.refcounts.get_mut(unit) {
            None => Ok(()),
            Some(count) if *count > 1 => {
                *count -= 1;
                Ok(())
            }
            Some(_) => {
                // Dropped before the call: a failed RemoveMatch leaves at worst a stray rule.
                state.refcounts.remove(unit);
                let rule = MatchRule::unit_properties_changed(unit);
                #[cfg(feature = "tracing")]
                tracing::debug!(%unit, %rule, "match rule removed");
                self.transport.remove_match(&rule).await
            }
        }
    }
}
