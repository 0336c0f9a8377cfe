//! Tri-state field for partial updates.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A patch field that keeps "absent", "explicit null" and "value" apart.
///
/// Use together with `#[serde(default)]` on the containing struct: a missing
/// key falls back to [`Optional::Omitted`], while a present key decodes to
/// either [`Optional::Null`] or [`Optional::Value`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Optional<T> {
    /// The field was not part of the payload; leave the stored value alone.
    #[default]
    Omitted,
    /// The field was sent as `null`; clear the stored value.
    Null,
    /// The field was sent with a value; replace the stored value.
    Value(T),
}

impl<T> Optional<T> {
    /// Whether the field was present in the payload at all.
    pub fn is_defined(&self) -> bool {
        !matches!(self, Self::Omitted)
    }

    /// Whether the field was present and explicitly `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether the field was absent from the payload.
    pub fn is_omitted(&self) -> bool {
        matches!(self, Self::Omitted)
    }

    /// The carried value, only when defined and not null.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            _ => None,
        }
    }
}

impl<T> From<Option<T>> for Optional<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Value(v),
            None => Self::Null,
        }
    }
}

impl<'de, T> Deserialize<'de> for Optional<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Only reached when the key is present; absence goes through Default.
        Option::<T>::deserialize(deserializer).map(Self::from)
    }
}

impl<T> Serialize for Optional<T>
where
    T: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Value(v) => serializer.serialize_some(v),
            Self::Null | Self::Omitted => serializer.serialize_none(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, Deserialize, Serialize)]
    #[serde(default)]
    struct Probe {
        #[serde(skip_serializing_if = "Optional::is_omitted")]
        flag: Optional<bool>,
    }

    #[test]
    fn test_absent_key_is_omitted() {
        let probe: Probe = serde_json::from_str("{}").unwrap();
        assert!(!probe.flag.is_defined());
        assert!(probe.flag.value().is_none());
    }

    #[test]
    fn test_null_key_is_null() {
        let probe: Probe = serde_json::from_str(r#"{"flag": null}"#).unwrap();
        assert!(probe.flag.is_defined());
        assert!(probe.flag.is_null());
        assert!(probe.flag.value().is_none());
    }

    #[test]
    fn test_present_key_is_value() {
        let probe: Probe = serde_json::from_str(r#"{"flag": false}"#).unwrap();
        assert!(probe.flag.is_defined());
        assert!(!probe.flag.is_null());
        assert_eq!(probe.flag.value(), Some(&false));
    }

    #[test]
    fn test_wrong_type_is_rejected() {
        assert!(serde_json::from_str::<Probe>(r#"{"flag": "yes"}"#).is_err());
    }

    #[test]
    fn test_serialize_keeps_states_apart() {
        let omitted = serde_json::to_string(&Probe { flag: Optional::Omitted }).unwrap();
        let null = serde_json::to_string(&Probe { flag: Optional::Null }).unwrap();
        let value = serde_json::to_string(&Probe { flag: Optional::Value(true) }).unwrap();

        assert_eq!(omitted, "{}");
        assert_eq!(null, r#"{"flag":null}"#);
        assert_eq!(value, r#"{"flag":true}"#);
    }
}
