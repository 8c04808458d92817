/// systemd `StartUnit`/`StopUnit` mode.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[non_exhaustive]
pub enum UnitStartMode {
    #[default]
    Replace,
    Fail,
    Isolate,
    IgnoreDependencies,
    IgnoreRequirements,
    Other(String),
}

impl UnitStartMode {
    pub(crate) fn as_dbus_str(&self) -> &str {
        match self {
            UnitStartMode::Replace => "replace",
            UnitStartMode::Fail => "fail",
            UnitStartMode::Isolate => "isolate",
            UnitStartMode::IgnoreDependencies => "ignore-dependencies",
            UnitStartMode::IgnoreRequirements => "ignore-requirements",
            UnitStartMode::Other(s) => s.as_str(),
        }
    }
}

/// systemd `Unit.LoadState`.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum LoadState {
    Loaded,
    NotFound,
    Error,
    Masked,
    Stub,
    Merged,
    Generated,
    Transient,
    BadSetting,
    Unknown(String),
}

impl LoadState {
    pub fn parse(s: &str) -> Self {
        match s {
            "loaded" => LoadState::Loaded,
            "not-found" => LoadState::NotFound,
            "error" => LoadState::Error,
            "masked" => LoadState::Masked,
            "stub" => LoadState::Stub,
            "merged" => LoadState::Merged,
            "generated" => LoadState::Generated,
            "transient" => LoadState::Transient,
            "bad-setting" => LoadState::BadSetting,
            other => LoadState::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            LoadState::Loaded => "loaded",
            LoadState::NotFound => "not-found",
            LoadState::Error => "error",
            LoadState::Masked => "masked",
            LoadState::Stub => "stub",
            LoadState::Merged => "merged",
            LoadState::Generated => "generated",
            LoadState::Transient => "transient",
            LoadState::BadSetting => "bad-setting",
            LoadState::Unknown(s) => s.as_str(),
        }
    }
}

/// systemd `Unit.ActiveState`.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum ActiveState {
    Active,
    Reloading,
    Inactive,
    Failed,
    Activating,
    Deactivating,
    Maintenance,
    Unknown(String),
}

impl ActiveState {
    pub fn parse(s: &str) -> Self {
        match s {
            "active" => ActiveState::Active,
            "reloading" => ActiveState::Reloading,
            "inactive" => ActiveState::Inactive,
            "failed" => ActiveState::Failed,
            "activating" => ActiveState::Activating,
            "deactivating" => ActiveState::Deactivating,
            "maintenance" => ActiveState::Maintenance,
            other => ActiveState::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ActiveState::Active => "active",
            ActiveState::Reloading => "reloading",
            ActiveState::Inactive => "inactive",
            ActiveState::Failed => "failed",
            ActiveState::Activating => "activating",
            ActiveState::Deactivating => "deactivating",
            ActiveState::Maintenance => "maintenance",
            ActiveState::Unknown(s) => s.as_str(),
        }
    }
}

/// One row of `org.freedesktop.systemd1.Manager.ListUnits`.
///
/// Produced fresh on every listing; never updated in place.
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct UnitStatus {
    pub name: String,
    pub description: Option<String>,
    pub load_state: LoadState,
    pub active_state: ActiveState,
    pub sub_state: Option<String>,
    pub followed: Option<String>,
    pub unit_path: String,
    pub job_id: Option<u32>,
    pub job_type: Option<String>,
    pub job_path: Option<String>,
}

impl UnitStatus {
    /// Build a status row with no description, sub state, or queued job.
    ///
    /// Intended for custom `Transport` implementations; remaining fields are public and may be
    /// filled in afterwards.
    pub fn new(name: impl Into<String>, load_state: LoadState, active_state: ActiveState) -> Self {
        let name = name.into();
        let unit_path = format!(
            "{}{}",
            crate::util::UNIT_PATH_PREFIX,
            crate::util::escape_path_label(&name)
        );
        Self {
            name,
            description: None,
            load_state,
            active_state,
            sub_state: None,
            followed: None,
            unit_path,
            job_id: None,
            job_type: None,
            job_path: None,
        }
    }

    pub(crate) fn from_dbus(item: crate::bus::ListUnitItem) -> Self {
        let (
            name,
            description,
            load_state,
            active_state,
            sub_state,
            followed,
            unit_path,
            job_id,
            job_type,
            job_path,
        ) = item;

        let has_job = job_id != 0 && job_path.as_str() != "/";
        let (job_id, job_type, job_path) = if has_job {
            (Some(job_id), non_empty(job_type), Some(job_path.to_string()))
        } else {
            (None, None, None)
        };

        Self {
            name,
            description: non_empty(description),
            load_state: LoadState::parse(&load_state),
            active_state: ActiveState::parse(&active_state),
            sub_state: non_empty(sub_state),
            followed: non_empty(followed),
            unit_path: unit_path.to_string(),
            job_id,
            job_type,
            job_path,
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() { None } else { Some(s) }
}

/// Default change predicate for polling subscriptions.
///
/// Only the name, description, and state fields are compared; a change in the queued job alone
/// does not count.
pub fn unit_status_differs(a: &UnitStatus, b: &UnitStatus) -> bool {
    a.name != b.name
        || a.description != b.description
        || a.load_state != b.load_state
        || a.active_state != b.active_state
        || a.sub_state != b.sub_state
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::unwrap_used)]

    use super::*;
    use zbus::zvariant::OwnedObjectPath;

    fn path(s: &str) -> OwnedObjectPath {
        OwnedObjectPath::try_from(s).expect("valid object path")
    }

    #[test]
    fn unit_start_mode_maps_to_dbus_string() {
        assert_eq!(UnitStartMode::Replace.as_dbus_str(), "replace");
        assert_eq!(UnitStartMode::Fail.as_dbus_str(), "fail");
        assert_eq!(UnitStartMode::Isolate.as_dbus_str(), "isolate");
        assert_eq!(
            UnitStartMode::IgnoreDependencies.as_dbus_str(),
            "ignore-dependencies"
        );
        assert_eq!(
            UnitStartMode::Other("custom".to_string()).as_dbus_str(),
            "custom"
        );
    }

    #[test]
    fn states_parse_and_render_symmetrically() {
        for s in ["loaded", "not-found", "masked", "bad-setting", "wat"] {
            assert_eq!(LoadState::parse(s).as_str(), s);
        }
        for s in ["active", "failed", "deactivating", "wat"] {
            assert_eq!(ActiveState::parse(s).as_str(), s);
        }
        assert_eq!(
            ActiveState::parse("wat"),
            ActiveState::Unknown("wat".to_string())
        );
    }

    #[test]
    fn list_units_decodes_job_fields_as_none_when_not_present() {
        let item = (
            "nginx.service".to_string(),
            "nginx".to_string(),
            "loaded".to_string(),
            "active".to_string(),
            "running".to_string(),
            "".to_string(),
            path("/org/freedesktop/systemd1/unit/nginx_2eservice"),
            0u32,
            "".to_string(),
            path("/"),
        );

        let s = UnitStatus::from_dbus(item);
        assert_eq!(s.name, "nginx.service");
        assert_eq!(s.load_state, LoadState::Loaded);
        assert_eq!(s.active_state, ActiveState::Active);
        assert_eq!(s.sub_state.as_deref(), Some("running"));
        assert_eq!(s.job_id, None);
        assert_eq!(s.job_path, None);
    }

    #[test]
    fn list_units_decodes_queued_job() {
        let item = (
            "x.service".to_string(),
            "".to_string(),
            "loaded".to_string(),
            "inactive".to_string(),
            "".to_string(),
            "".to_string(),
            path("/org/freedesktop/systemd1/unit/x_2eservice"),
            123u32,
            "start".to_string(),
            path("/org/freedesktop/systemd1/job/123"),
        );

        let s = UnitStatus::from_dbus(item);
        assert_eq!(s.description, None);
        assert_eq!(s.job_id, Some(123));
        assert_eq!(s.job_type.as_deref(), Some("start"));
        assert_eq!(
            s.job_path.as_deref(),
            Some("/org/freedesktop/systemd1/job/123")
        );
    }

    #[test]
    fn new_derives_escaped_unit_path() {
        let s = UnitStatus::new("foo-bar.service", LoadState::Loaded, ActiveState::Active);
        assert_eq!(
            s.unit_path,
            "/org/freedesktop/systemd1/unit/foo_2dbar_2eservice"
        );
    }

    #[test]
    fn differs_ignores_queued_job_but_not_sub_state() {
        let a = UnitStatus::new("a.service", LoadState::Loaded, ActiveState::Active);

        let mut queued = a.clone();
        queued.job_id = Some(7);
        assert!(!unit_status_differs(&a, &queued));

        let mut exited = a.clone();
        exited.sub_state = Some("exited".to_string());
        assert!(unit_status_differs(&a, &exited));
    }
}
