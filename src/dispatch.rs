//! Job correlation and signal routing.
//!
//! One background task owns the pending-job table and is the only reader of the transport's
//! signal stream. Submissions reach it through a bounded queue, so "issue the call, record the
//! token" is never interleaved with signal handling: a `JobRemoved` for a fresh job cannot be
//! processed before its entry exists.
//!
//! ```text
//! callers ──► [request queue] ──┐
//!                               ├──► dispatcher task ──► Transport::call_job
//! Transport::signals ───────────┘         │
//!                                          ├──► JobRemoved ──► pending table ──► oneshot
//!                                          └──► UnitNew / PropertiesChanged ──► Registry
//! ```

use crate::registry::Registry;
use crate::transport::{SYSTEMD_UNIT_INTERFACE, Signal, SignalStream, Transport};
use crate::{Error, JobOutput, JobPath, JobRequest, JobResult, PropertiesUpdate, Result, util};

use std::collections::HashMap;
use std::sync::Arc;

use futures_channel::{mpsc, oneshot};
use futures_util::{SinkExt, StreamExt};

#[derive(Debug)]
pub(crate) enum Command {
    Submit {
        request: JobRequest,
        reply: oneshot::Sender<JobResult>,
    },
    PendingCount {
        reply: oneshot::Sender<usize>,
    },
}

/// Caller-side handle to the dispatcher task.
#[derive(Clone, Debug)]
pub(crate) struct Dispatcher {
    tx: mpsc::Sender<Command>,
}

impl Dispatcher {
    pub(crate) fn start(
        transport: Arc<dyn Transport>,
        registry: Arc<Registry>,
        signals: SignalStream,
        request_buffer: usize,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::channel(request_buffer);
        crate::runtime::spawn("unitlink-dispatch", run(transport, registry, rx, signals))?;
        Ok(Self { tx })
    }

    /// Submit a job and wait for its single result.
    pub(crate) async fn submit(&self, request: JobRequest) -> JobResult {
        let (reply, result) = oneshot::channel();
        self.send(Command::Submit { request, reply }).await?;
        result.await.map_err(|_| Error::Disconnected {
            context: "job result dropped before completion",
        })?
    }

    pub(crate) async fn pending_count(&self) -> Result<usize> {
        let (reply, count) = oneshot::channel();
        self.send(Command::PendingCount { reply }).await?;
        count.await.map_err(|_| Error::Disconnected {
            context: "dispatcher stopped",
        })
    }

    async fn send(&self, cmd: Command) -> Result<()> {
        let mut tx = self.tx.clone();
        tx.send(cmd).await.map_err(|_| Error::Disconnected {
            context: "dispatcher stopped",
        })
    }
}

/// Correlation token → waiting caller. Owned by the dispatcher task alone.
#[derive(Debug, Default)]
pub(crate) struct PendingJobs {
    jobs: HashMap<JobPath, oneshot::Sender<JobResult>>,
}

impl PendingJobs {
    pub(crate) fn insert(&mut self, job: JobPath, reply: oneshot::Sender<JobResult>) {
        self.jobs.insert(job, reply);
    }

    /// Deliver `output` to the waiter for `job`, if any. Returns whether a waiter was found.
    pub(crate) fn resolve(&mut self, job: &JobPath, output: JobOutput) -> bool {
        let Some(reply) = self.jobs.remove(job) else {
            return false;
        };
        // The caller may have given up (timeout); the entry is retired either way.
        let _ = reply.send(Ok(output));
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.jobs.len()
    }
}

async fn run(
    transport: Arc<dyn Transport>,
    registry: Arc<Registry>,
    mut commands: mpsc::Receiver<Command>,
    signals: SignalStream,
) {
    let mut pending = PendingJobs::default();
    let mut signals = signals.fuse();

    loop {
        futures_util::select! {
            cmd = commands.next() => match cmd {
                Some(Command::Submit { request, reply }) => {
                    submit(transport.as_ref(), &mut pending, request, reply).await;
                }
                Some(Command::PendingCount { reply }) => {
                    let _ = reply.send(pending.len());
                }
                None => break,
            },
            sig = signals.next() => match sig {
                Some(Ok(signal)) => route(&mut pending, &registry, signal).await,
                Some(Err(e)) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(error = %e, "undecodable signal");
                    registry.publish_error(e).await;
                }
                None => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(pending = pending.len(), "signal stream ended");
                    break;
                }
            },
        }
    }
}

async fn submit(
    transport: &dyn Transport,
    pending: &mut PendingJobs,
    request: JobRequest,
    reply: oneshot::Sender<JobResult>,
) {
    #[cfg(feature = "tracing")]
    tracing::info!(%request, "job submit");

    match transport.call_job(request.method(), request.args()).await {
        Ok(job) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(%request, %job, "job queued");
            pending.insert(job, reply);
        }
        Err(e) => {
            #[cfg(feature = "tracing")]
            tracing::debug!(%request, error = %e, "job submission failed");
            let _ = reply.send(Err(e));
        }
    }
}

/// Classify one signal and hand it to its consumer.
pub(crate) async fn route(pending: &mut PendingJobs, registry: &Registry, signal: Signal) {
    match signal {
        Signal::JobRemoved { job, result, .. } => {
            let _found = pending.resolve(&job, JobOutput::parse(&result));
            #[cfg(feature = "tracing")]
            tracing::debug!(%job, %result, found = _found, "job removed");
        }
        Signal::UnitNew { unit, .. } => {
            registry.publish(PropertiesUpdate::created(unit)).await;
        }
        Signal::PropertiesChanged {
            path,
            interface,
            changed,
            ..
        } => {
            if interface != SYSTEMD_UNIT_INTERFACE {
                return;
            }
            let Some(unit) = util::unit_name_from_path(&path) else {
                return;
            };
            registry.publish(PropertiesUpdate::new(unit, changed)).await;
        }
        Signal::Other { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn job(n: u32) -> JobPath {
        JobPath::new(format!("/org/freedesktop/systemd1/job/{n}"))
    }

    #[test]
    fn resolve_delivers_once_and_retires_entry() {
        let mut pending = PendingJobs::default();
        let (tx, mut rx) = oneshot::channel();
        pending.insert(job(1), tx);
        assert_eq!(pending.len(), 1);

        assert!(pending.resolve(&job(1), JobOutput::Done));
        assert_eq!(pending.len(), 0);

        let delivered = rx.try_recv().expect("not canceled").expect("delivered");
        assert_eq!(delivered.expect("ok"), JobOutput::Done);

        assert!(!pending.resolve(&job(1), JobOutput::Done));
    }

    #[test]
    fn unknown_token_is_discarded() {
        let mut pending = PendingJobs::default();
        let (tx, mut rx) = oneshot::channel();
        pending.insert(job(1), tx);

        assert!(!pending.resolve(&job(2), JobOutput::Failed));
        assert_eq!(pending.len(), 1);
        assert!(rx.try_recv().expect("not canceled").is_none());
    }

    #[test]
    fn resolve_tolerates_abandoned_waiter() {
        let mut pending = PendingJobs::default();
        let (tx, rx) = oneshot::channel();
        pending.insert(job(3), tx);
        drop(rx);

        assert!(pending.resolve(&job(3), JobOutput::Canceled));
        assert_eq!(pending.len(), 0);
    }
}
