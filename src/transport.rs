//! The bus boundary the engine consumes.
//!
//! `Transport` is the only way the engine reaches the service manager. The crate ships a zbus
//! implementation (`ZbusTransport`); anything else that can make the calls and deliver the signals
//! in arrival order can be injected through `UnitLink::with_transport`.

use crate::runtime::BoxFuture;
use crate::{JobPath, Properties, Result, UnitStatus};

use std::fmt;
use std::pin::Pin;

use futures_util::Stream;

pub(crate) const SYSTEMD_DESTINATION: &str = "org.freedesktop.systemd1";
pub(crate) const SYSTEMD_MANAGER_PATH: &str = "/org/freedesktop/systemd1";
pub(crate) const SYSTEMD_MANAGER_INTERFACE: &str = "org.freedesktop.systemd1.Manager";
pub(crate) const SYSTEMD_UNIT_INTERFACE: &str = "org.freedesktop.systemd1.Unit";
pub(crate) const DBUS_PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// Ordered stream of every broadcast signal delivered to the connection.
///
/// An `Err` item reports a signal that could not be decoded; the stream continues afterwards.
pub type SignalStream = Pin<Box<dyn Stream<Item = Result<Signal>> + Send>>;

/// Connection to the service manager.
pub trait Transport: Send + Sync + 'static {
    /// Invoke a job-producing manager method (e.g. `StartUnit`) and return the job path.
    fn call_job<'a>(&'a self, method: &'a str, args: &'a [String]) -> BoxFuture<'a, Result<JobPath>>;

    /// Full listing of units currently loaded by the manager.
    fn list_units(&self) -> BoxFuture<'_, Result<Vec<UnitStatus>>>;

    /// Start delivering broadcast signals. Called once, before any match rule is added.
    fn signals(&self) -> BoxFuture<'_, Result<SignalStream>>;

    /// Ask the bus to route signals matching `rule` to this connection.
    fn add_match<'a>(&'a self, rule: &'a MatchRule) -> BoxFuture<'a, Result<()>>;

    /// Undo a previous `add_match`.
    fn remove_match<'a>(&'a self, rule: &'a MatchRule) -> BoxFuture<'a, Result<()>>;
}

/// Broadcast signal, decoded into a typed shape at the transport boundary.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Signal {
    /// `org.freedesktop.systemd1.Manager.JobRemoved(u id, o job, s unit, s result)`.
    JobRemoved {
        id: u32,
        job: JobPath,
        unit: String,
        result: String,
    },
    /// `org.freedesktop.systemd1.Manager.UnitNew(s id, o unit)`.
    UnitNew { unit: String, path: String },
    /// `org.freedesktop.DBus.Properties.PropertiesChanged(s interface, a{sv} changed, as invalidated)`
    /// emitted by the object at `path`.
    PropertiesChanged {
        path: String,
        interface: String,
        changed: Properties,
        invalidated: Vec<String>,
    },
    /// Anything else that reached the connection.
    Other { interface: String, member: String },
}

/// A bus match expression (`org.freedesktop.DBus.AddMatch` argument).
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct MatchRule {
    rule: String,
}

impl MatchRule {
    /// Signals emitted by the systemd manager object (`JobRemoved`, `UnitNew`, ...).
    pub fn manager_signal(member: &str) -> Self {
        Self {
            rule: format!(
                "type='signal',sender='{SYSTEMD_DESTINATION}',interface='{SYSTEMD_MANAGER_INTERFACE}',member='{member}',path='{SYSTEMD_MANAGER_PATH}'"
            ),
        }
    }

    /// `PropertiesChanged` for one unit's object.
    pub fn unit_properties_changed(unit: &str) -> Self {
        Self {
            rule: format!(
                "type='signal',sender='{SYSTEMD_DESTINATION}',interface='{DBUS_PROPERTIES_INTERFACE}',member='PropertiesChanged',path='{}{}'",
                crate::util::UNIT_PATH_PREFIX,
                crate::util::escape_path_label(unit)
            ),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.rule
    }
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rule)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn unit_rule_targets_escaped_unit_path() {
        let rule = MatchRule::unit_properties_changed("nginx.service");
        assert_eq!(
            rule.as_str(),
            "type='signal',sender='org.freedesktop.systemd1',interface='org.freedesktop.DBus.Properties',member='PropertiesChanged',path='/org/freedesktop/systemd1/unit/nginx_2eservice'"
        );
    }

    #[test]
    fn manager_rule_names_member() {
        let rule = MatchRule::manager_signal("JobRemoved");
        assert!(rule.as_str().contains("member='JobRemoved'"));
        assert!(
            rule.as_str()
                .contains("interface='org.freedesktop.systemd1.Manager'")
        );
        assert_eq!(rule.to_string(), rule.as_str());
    }
}
