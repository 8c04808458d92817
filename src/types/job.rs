use std::fmt;

/// Correlation token returned by a job submission: the job's D-Bus object path.
///
/// Opaque to the engine; only compared for equality against `JobRemoved` payloads.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct JobPath(String);

impl JobPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A unit-management request: a `org.freedesktop.systemd1.Manager` method and its arguments.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct JobRequest {
    method: String,
    args: Vec<String>,
}

impl JobRequest {
    pub fn new<I, S>(method: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method: method.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The unit the request targets (its first argument), for error reporting.
    pub fn unit(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or("")
    }
}

impl fmt::Display for JobRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.method, self.args.join(", "))
    }
}

/// The completion string carried by `JobRemoved`.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum JobOutput {
    Done,
    Canceled,
    Timeout,
    Failed,
    Dependency,
    Skipped,
    Other(String),
}

impl JobOutput {
    pub fn parse(s: &str) -> Self {
        match s {
            "done" => JobOutput::Done,
            "canceled" => JobOutput::Canceled,
            "timeout" => JobOutput::Timeout,
            "failed" => JobOutput::Failed,
            "dependency" => JobOutput::Dependency,
            "skipped" => JobOutput::Skipped,
            other => JobOutput::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobOutput::Done => "done",
            JobOutput::Canceled => "canceled",
            JobOutput::Timeout => "timeout",
            JobOutput::Failed => "failed",
            JobOutput::Dependency => "dependency",
            JobOutput::Skipped => "skipped",
            JobOutput::Other(s) => s.as_str(),
        }
    }

    pub fn is_done(&self) -> bool {
        *self == JobOutput::Done
    }
}

impl fmt::Display for JobOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exactly one of these is delivered per submission.
///
/// Submission failures and completion outcomes share this shape.
pub type JobResult = crate::Result<JobOutput>;
