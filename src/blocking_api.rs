use crate::{
    JobRequest, JobResult, Jobs, Result, UnitLink, UnitLinkOptions, UnitStartMode, UnitStatus,
};

use std::time::Duration;

/// Blocking wrapper for `UnitLink` (feature=`blocking`).
///
/// This is a convenience API for environments where a synchronous interface is preferred.
/// Internally it uses the selected runtime (`rt-async-io` or `rt-tokio`) to drive the async
/// implementation.
#[derive(Clone, Debug)]
pub struct BlockingUnitLink {
    inner: UnitLink,
}

impl BlockingUnitLink {
    /// Connect to the system D-Bus (blocking).
    pub fn connect_system() -> Result<Self> {
        let inner = crate::runtime::block_on_result(UnitLink::connect_system())?;
        Ok(Self { inner })
    }

    /// Connect to the system D-Bus with custom options (blocking).
    pub fn connect_system_with(opts: UnitLinkOptions) -> Result<Self> {
        let inner = crate::runtime::block_on_result(UnitLink::connect_system_with(opts))?;
        Ok(Self { inner })
    }

    /// Access job submission APIs (blocking wrappers).
    pub fn jobs(&self) -> BlockingJobs {
        BlockingJobs {
            inner: self.inner.jobs(),
        }
    }

    pub fn list_units(&self) -> Result<Vec<UnitStatus>> {
        crate::runtime::block_on_result(self.inner.units().list_units())
    }

    /// The async handle, for subscriptions.
    pub fn as_async(&self) -> &UnitLink {
        &self.inner
    }
}

/// Blocking wrapper for `Jobs`.
#[derive(Clone, Debug)]
pub struct BlockingJobs {
    inner: Jobs,
}

impl BlockingJobs {
    pub fn start(&self, unit: &str, mode: UnitStartMode) -> JobResult {
        crate::runtime::block_on_result(self.inner.start(unit, mode))
    }

    pub fn stop(&self, unit: &str, mode: UnitStartMode) -> JobResult {
        crate::runtime::block_on_result(self.inner.stop(unit, mode))
    }

    pub fn restart(&self, unit: &str, mode: UnitStartMode) -> JobResult {
        crate::runtime::block_on_result(self.inner.restart(unit, mode))
    }

    pub fn reload(&self, unit: &str, mode: UnitStartMode) -> JobResult {
        crate::runtime::block_on_result(self.inner.reload(unit, mode))
    }

    pub fn submit(&self, request: JobRequest) -> JobResult {
        crate::runtime::block_on_result(self.inner.submit(request))
    }

    /// Wait at most `timeout` for the job's completion signal.
    pub fn submit_with_timeout(&self, request: JobRequest, timeout: Duration) -> JobResult {
        crate::runtime::block_on_result(self.inner.submit_with_timeout(request, timeout))
    }
}
