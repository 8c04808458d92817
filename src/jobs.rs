use crate::{Error, JobRequest, JobResult, Result, UnitStartMode, util};

use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Debug)]
/// Unit job submission APIs.
///
/// Every call resolves exactly once: with the `JobRemoved` result for the queued job, or with
/// the error that prevented it from being queued.
pub struct Jobs {
    inner: Arc<crate::Inner>,
}

impl Jobs {
    pub(crate) fn new(inner: Arc<crate::Inner>) -> Self {
        Self { inner }
    }

    /// Start a unit and wait for the job to finish.
    pub async fn start(&self, unit: &str, mode: UnitStartMode) -> JobResult {
        self.unit_job(JobKind::Start, unit, mode).await
    }

    /// Stop a unit and wait for the job to finish.
    pub async fn stop(&self, unit: &str, mode: UnitStartMode) -> JobResult {
        self.unit_job(JobKind::Stop, unit, mode).await
    }

    /// Restart a unit and wait for the job to finish.
    ///
    /// systemd reports a restart as a single job, so one result is delivered.
    pub async fn restart(&self, unit: &str, mode: UnitStartMode) -> JobResult {
        self.unit_job(JobKind::Restart, unit, mode).await
    }

    /// Reload a unit's configuration and wait for the job to finish.
    pub async fn reload(&self, unit: &str, mode: UnitStartMode) -> JobResult {
        self.unit_job(JobKind::Reload, unit, mode).await
    }

    /// Restart a unit only if it is running.
    pub async fn try_restart(&self, unit: &str, mode: UnitStartMode) -> JobResult {
        self.unit_job(JobKind::TryRestart, unit, mode).await
    }

    /// Reload a unit if it supports reloading, otherwise restart it.
    pub async fn reload_or_restart(&self, unit: &str, mode: UnitStartMode) -> JobResult {
        self.unit_job(JobKind::ReloadOrRestart, unit, mode).await
    }

    /// Like `reload_or_restart`, but only restarts a unit that is running.
    pub async fn reload_or_try_restart(&self, unit: &str, mode: UnitStartMode) -> JobResult {
        self.unit_job(JobKind::ReloadOrTryRestart, unit, mode).await
    }

    /// Submit an arbitrary job-producing manager method.
    ///
    /// There is no built-in cancellation: the wait is unbounded if systemd never reports the
    /// job as removed. See `submit_with_timeout`.
    pub async fn submit(&self, request: JobRequest) -> JobResult {
        self.inner.dispatcher.submit(request).await
    }

    /// Like `submit`, but gives up with `Error::JobTimeout` after `timeout`.
    ///
    /// The job keeps running and its correlation entry stays pending until systemd reports it.
    pub async fn submit_with_timeout(&self, request: JobRequest, timeout: Duration) -> JobResult {
        if timeout.is_zero() {
            return Err(Error::invalid_input("timeout must be > 0"));
        }
        let unit = request.unit().to_string();
        let mut result = std::pin::pin!(futures_util::FutureExt::fuse(self.submit(request)));
        let mut deadline = futures_util::FutureExt::fuse(crate::runtime::sleep(timeout));
        futures_util::select! {
            out = result => out,
            _ = deadline => {
                #[cfg(feature = "tracing")]
                tracing::debug!(%unit, ?timeout, "job wait timed out");
                Err(Error::JobTimeout { unit, timeout })
            }
        }
    }

    /// Number of submitted jobs still waiting for their completion signal.
    pub async fn pending_jobs(&self) -> Result<usize> {
        self.inner.dispatcher.pending_count().await
    }

    async fn unit_job(&self, kind: JobKind, unit: &str, mode: UnitStartMode) -> JobResult {
        let unit = util::canonicalize_unit_name(unit)?;
        let request = JobRequest::new(kind.method(), [unit, mode.as_dbus_str().to_string()]);
        self.submit(request).await
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum JobKind {
    Start,
    Stop,
    Restart,
    Reload,
    TryRestart,
    ReloadOrRestart,
    ReloadOrTryRestart,
}

impl JobKind {
    pub(crate) fn method(self) -> &'static str {
        match self {
            JobKind::Start => "StartUnit",
            JobKind::Stop => "StopUnit",
            JobKind::Restart => "RestartUnit",
            JobKind::Reload => "ReloadUnit",
            JobKind::TryRestart => "TryRestartUnit",
            JobKind::ReloadOrRestart => "ReloadOrRestartUnit",
            JobKind::ReloadOrTryRestart => "ReloadOrTryRestartUnit",
        }
    }
}
