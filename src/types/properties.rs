use std::collections::HashMap;
use std::sync::Arc;

use zbus::zvariant::OwnedValue;

/// A `PropertiesChanged` property bag (values are stored internally as D-Bus variants).
///
/// This type intentionally does not expose any zbus/zvariant types in its public API. Clones share
/// the underlying map, so fanning one update out to many subscribers does not copy it.
#[derive(Clone, Debug, Default)]
#[non_exhaustive]
pub struct Properties {
    values: Arc<HashMap<String, OwnedValue>>,
}

impl Properties {
    pub(crate) fn from_dbus(values: HashMap<String, OwnedValue>) -> Self {
        Self {
            values: Arc::new(values),
        }
    }

    /// Build a bag of string-valued properties, for custom `Transport` implementations.
    pub fn from_strs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let values = pairs
            .into_iter()
            .filter_map(|(k, v)| {
                OwnedValue::try_from(zbus::zvariant::Value::from(v))
                    .ok()
                    .map(|v| (k.to_string(), v))
            })
            .collect();
        Self::from_dbus(values)
    }

    /// Returns true if the property exists.
    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// List all property names.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a string property as `&str` (no allocation).
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| <&str>::try_from(v).ok())
    }

    /// Get a string property as `&str`, mapping empty strings to `None`.
    pub fn get_opt_str(&self, key: &str) -> Option<&str> {
        let s = self.get_str(key)?;
        if s.is_empty() { None } else { Some(s) }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(|v| bool::try_from(v).ok())
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.values.get(key).and_then(|v| u32::try_from(v).ok())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.values.get(key).and_then(|v| u64::try_from(v).ok())
    }

    pub fn get_i32(&self, key: &str) -> Option<i32> {
        self.values.get(key).and_then(|v| i32::try_from(v).ok())
    }

    /// `ActiveState`, if it is part of this change.
    pub fn active_state(&self) -> Option<crate::ActiveState> {
        self.get_str("ActiveState").map(crate::ActiveState::parse)
    }

    /// `SubState`, if it is part of this change.
    pub fn sub_state(&self) -> Option<&str> {
        self.get_opt_str("SubState")
    }
}

/// A push-model update for one unit.
///
/// Produced for `PropertiesChanged` on a unit object (with the changed values) and for `UnitNew`
/// (with an empty bag).
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct PropertiesUpdate {
    pub unit: String,
    pub changed: Properties,
}

impl PropertiesUpdate {
    pub fn new(unit: impl Into<String>, changed: Properties) -> Self {
        Self {
            unit: unit.into(),
            changed,
        }
    }

    pub(crate) fn created(unit: impl Into<String>) -> Self {
        Self::new(unit, Properties::default())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]
    #![allow(clippy::panic)]
    #![allow(clippy::unwrap_used)]

    use super::*;
    use zbus::zvariant::Value;

    fn owned_str(s: &str) -> OwnedValue {
        OwnedValue::try_from(Value::from(s)).expect("owned string value")
    }

    #[test]
    fn unit_state_getters_read_changed_values() {
        let mut m = HashMap::new();
        m.insert("ActiveState".to_string(), owned_str("failed"));
        m.insert("SubState".to_string(), owned_str(""));

        let p = Properties::from_dbus(m);
        assert_eq!(p.active_state(), Some(crate::ActiveState::Failed));
        assert_eq!(p.sub_state(), None);
        assert_eq!(p.get_str("SubState"), Some(""));
    }

    #[test]
    fn numeric_getters_return_none_on_type_mismatch() {
        let mut m = HashMap::new();
        m.insert("NRestarts".to_string(), OwnedValue::from(3u32));
        m.insert("ExecMainStatus".to_string(), OwnedValue::from(-1i32));

        let p = Properties::from_dbus(m);
        assert_eq!(p.get_u32("NRestarts"), Some(3));
        assert_eq!(p.get_i32("ExecMainStatus"), Some(-1));
        assert_eq!(p.get_str("NRestarts"), None);
        assert_eq!(p.get_bool("NRestarts"), None);
    }

    #[test]
    fn created_update_has_empty_bag() {
        let u = PropertiesUpdate::created("foo.service");
        assert_eq!(u.unit, "foo.service");
        assert!(u.changed.is_empty());
        assert_eq!(u.changed.keys().count(), 0);
    }
}
