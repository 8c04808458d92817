use crate::runtime::BoxFuture;
use crate::transport::{
    DBUS_PROPERTIES_INTERFACE, MatchRule, SYSTEMD_DESTINATION, SYSTEMD_MANAGER_INTERFACE,
    SYSTEMD_MANAGER_PATH, Signal, SignalStream, Transport,
};
use crate::{Error, JobPath, Properties, Result, UnitLinkOptions, UnitStatus};

use std::collections::HashMap;
use std::time::Duration;

use futures_util::StreamExt;
use zbus::zvariant::{OwnedObjectPath, OwnedValue};

const DBUS_DESTINATION: &str = "org.freedesktop.DBus";
const DBUS_PATH: &str = "/org/freedesktop/DBus";
const DBUS_INTERFACE: &str = "org.freedesktop.DBus";

pub(crate) type ListUnitItem = (
    String,
    String,
    String,
    String,
    String,
    String,
    OwnedObjectPath,
    u32,
    String,
    OwnedObjectPath,
);

/// `Transport` backed by a zbus connection to the system or session bus.
#[derive(Debug)]
pub struct ZbusTransport {
    conn: zbus::Connection,
    dbus_call_timeout: Duration,
}

impl ZbusTransport {
    /// Connect to the system bus and subscribe to systemd manager signals.
    pub async fn connect_system(opts: &UnitLinkOptions) -> Result<Self> {
        let builder = zbus::connection::Builder::system().map_err(|e| {
            Error::BackendUnavailable {
                backend: "system_bus",
                detail: e.to_string(),
            }
        })?;
        Self::connect(builder, "system_bus", opts).await
    }

    /// Connect to the session bus (systemd user instance).
    pub async fn connect_session(opts: &UnitLinkOptions) -> Result<Self> {
        let builder = zbus::connection::Builder::session().map_err(|e| {
            Error::BackendUnavailable {
                backend: "session_bus",
                detail: e.to_string(),
            }
        })?;
        Self::connect(builder, "session_bus", opts).await
    }

    /// Wrap an already established connection.
    ///
    /// The caller is responsible for having called `Manager.Subscribe` if it wants `UnitNew` and
    /// `PropertiesChanged` signals.
    pub fn from_connection(conn: zbus::Connection, opts: &UnitLinkOptions) -> Self {
        Self {
            conn,
            dbus_call_timeout: opts.dbus_call_timeout,
        }
    }

    async fn connect(
        builder: zbus::connection::Builder<'_>,
        backend: &'static str,
        opts: &UnitLinkOptions,
    ) -> Result<Self> {
        let conn = builder
            .method_timeout(opts.dbus_call_timeout)
            .max_queued(opts.signal_buffer)
            .build()
            .await
            .map_err(|e| Error::BackendUnavailable {
                backend,
                detail: e.to_string(),
            })?;
        let transport = Self::from_connection(conn, opts);
        transport.subscribe_manager().await?;
        Ok(transport)
    }

    async fn manager_proxy(&self) -> Result<zbus::Proxy<'_>> {
        zbus::Proxy::new(
            &self.conn,
            SYSTEMD_DESTINATION,
            SYSTEMD_MANAGER_PATH,
            SYSTEMD_MANAGER_INTERFACE,
        )
        .await
        .map_err(map_zbus_error)
    }

    async fn dbus_proxy(&self) -> Result<zbus::Proxy<'_>> {
        zbus::Proxy::new(&self.conn, DBUS_DESTINATION, DBUS_PATH, DBUS_INTERFACE)
            .await
            .map_err(map_zbus_error)
    }

    /// `Manager.Subscribe`: without it systemd only emits signals for jobs this client queued.
    async fn subscribe_manager(&self) -> Result<()> {
        let proxy = self.manager_proxy().await?;
        proxy
            .call::<_, _, ()>("Subscribe", &())
            .await
            .map_err(|e| map_zbus_method_error("subscribe", self.dbus_call_timeout, e, None))
    }

    async fn call_job_inner(&self, method: &str, args: &[String]) -> Result<JobPath> {
        let proxy = self.manager_proxy().await?;
        let unit = args.first().map(String::as_str);
        let reply: zbus::Result<OwnedObjectPath> = match args {
            [a] => proxy.call(method, &(a.as_str(),)).await,
            [a, b] => proxy.call(method, &(a.as_str(), b.as_str())).await,
            [a, b, c] => proxy.call(method, &(a.as_str(), b.as_str(), c.as_str())).await,
            _ => {
                return Err(Error::invalid_input(format!(
                    "{method}: expected 1 to 3 string arguments, got {}",
                    args.len()
                )));
            }
        };
        let path = reply
            .map_err(|e| map_zbus_method_error("submit_job", self.dbus_call_timeout, e, unit))?;
        Ok(JobPath::new(path.as_str()))
    }

    async fn list_units_inner(&self) -> Result<Vec<UnitStatus>> {
        let proxy = self.manager_proxy().await?;
        let items: Vec<ListUnitItem> = proxy
            .call("ListUnits", &())
            .await
            .map_err(|e| map_zbus_method_error("list_units", self.dbus_call_timeout, e, None))?;
        Ok(items.into_iter().map(UnitStatus::from_dbus).collect())
    }

    async fn match_call(&self, method: &'static str, rule: &MatchRule) -> Result<()> {
        let proxy = self.dbus_proxy().await?;
        proxy
            .call::<_, _, ()>(method, &(rule.as_str(),))
            .await
            .map_err(|e| map_zbus_method_error(method, self.dbus_call_timeout, e, None))
    }
}

impl Transport for ZbusTransport {
    fn call_job<'a>(&'a self, method: &'a str, args: &'a [String]) -> BoxFuture<'a, Result<JobPath>> {
        Box::pin(self.call_job_inner(method, args))
    }

    fn list_units(&self) -> BoxFuture<'_, Result<Vec<UnitStatus>>> {
        Box::pin(self.list_units_inner())
    }

    fn signals(&self) -> BoxFuture<'_, Result<SignalStream>> {
        Box::pin(async move {
            let stream = zbus::MessageStream::from(&self.conn).filter_map(|msg| {
                futures_util::future::ready(match msg {
                    Ok(msg) => decode_signal(&msg).transpose(),
                    Err(e) => Some(Err(map_zbus_error(e))),
                })
            });
            let stream: SignalStream = Box::pin(stream);
            Ok(stream)
        })
    }

    fn add_match<'a>(&'a self, rule: &'a MatchRule) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.match_call("AddMatch", rule))
    }

    fn remove_match<'a>(&'a self, rule: &'a MatchRule) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.match_call("RemoveMatch", rule))
    }
}

/// Decode a bus message into a `Signal`. Non-signal messages (method replies etc) yield `None`.
pub(crate) fn decode_signal(msg: &zbus::Message) -> Result<Option<Signal>> {
    if msg.message_type() != zbus::message::Type::Signal {
        return Ok(None);
    }
    let header = msg.header();
    let interface = header.interface().map(|i| i.as_str()).unwrap_or_default();
    let member = header.member().map(|m| m.as_str()).unwrap_or_default();
    let path = header.path().map(|p| p.as_str()).unwrap_or_default();

    let body = msg.body();
    let signal = match (interface, member) {
        (SYSTEMD_MANAGER_INTERFACE, "JobRemoved") => {
            let decoded: std::result::Result<(u32, OwnedObjectPath, String, String), _> =
                body.deserialize();
            let (id, job, unit, result) =
                decoded.map_err(|e| Error::signal_decode("JobRemoved", e))?;
            Signal::JobRemoved {
                id,
                job: JobPath::new(job.as_str()),
                unit,
                result,
            }
        }
        (SYSTEMD_MANAGER_INTERFACE, "UnitNew") => {
            let decoded: std::result::Result<(String, OwnedObjectPath), _> = body.deserialize();
            let (unit, unit_path) = decoded.map_err(|e| Error::signal_decode("UnitNew", e))?;
            Signal::UnitNew {
                unit,
                path: unit_path.to_string(),
            }
        }
        (DBUS_PROPERTIES_INTERFACE, "PropertiesChanged") => {
            let decoded: std::result::Result<
                (String, HashMap<String, OwnedValue>, Vec<String>),
                _,
            > = body.deserialize();
            let (changed_interface, changed, invalidated) =
                decoded.map_err(|e| Error::signal_decode("PropertiesChanged", e))?;
            Signal::PropertiesChanged {
                path: path.to_string(),
                interface: changed_interface,
                changed: Properties::from_dbus(changed),
                invalidated,
            }
        }
        _ => Signal::Other {
            interface: interface.to_string(),
            member: member.to_string(),
        },
    };
    Ok(Some(signal))
}

fn map_zbus_method_error(
    action: &'static str,
    timeout: Duration,
    err: zbus::Error,
    unit: Option<&str>,
) -> Error {
    match &err {
        zbus::Error::MethodError(name, detail, _reply) => {
            let name = name.to_string();
            let message = detail.clone().unwrap_or_default();

            if (name.contains("NoSuchUnit") || name.contains("UnknownUnit"))
                && let Some(unit) = unit
            {
                return Error::UnitNotFound {
                    unit: unit.to_string(),
                };
            }

            if name.contains("AccessDenied")
                || name.contains("PermissionDenied")
                || name.contains("PolicyKit")
            {
                return Error::PermissionDenied {
                    action,
                    detail: format!("{name}: {message}"),
                };
            }

            Error::DbusError { name, message }
        }
        zbus::Error::InputOutput(e) if e.kind() == std::io::ErrorKind::TimedOut => {
            Error::Timeout { action, timeout }
        }
        _ => map_zbus_error(err),
    }
}

fn map_zbus_error(err: zbus::Error) -> Error {
    match err {
        zbus::Error::MethodError(name, detail, _reply) => Error::DbusError {
            name: name.to_string(),
            message: detail.unwrap_or_default(),
        },
        zbus::Error::InputOutput(e) => Error::IoError {
            context: format!("dbus io error: {e}"),
        },
        other => Error::IoError {
            context: format!("dbus error: {other}"),
        },
    }
}
