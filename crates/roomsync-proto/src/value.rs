//! Schema-free message representation.
//!
//! At the codec boundary every protocol message is a [`FieldMap`]: field
//! number to [`Value`]. Typed payloads in [`crate::payloads`] convert to and
//! from this form through their field tables.

use std::collections::BTreeMap;

/// A decoded or to-be-encoded field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Length-delimited UTF-8 string
    Str(String),
    /// Varint integer
    UInt(u64),
    /// Varint boolean
    Bool(bool),
    /// Length-delimited nested message
    Message(FieldMap),
    /// Every occurrence of a repeated field, in wire order
    Repeated(Vec<Value>),
}

impl Value {
    /// Returns true for proto3 default values that are elided on the wire.
    ///
    /// Nested messages and repeated fields are never considered default;
    /// an empty repeated field is elided by the encoder because it has no
    /// occurrences.
    pub fn is_default(&self) -> bool {
        match self {
            Self::Str(s) => s.is_empty(),
            Self::UInt(v) => *v == 0,
            Self::Bool(b) => !b,
            Self::Message(_) | Self::Repeated(_) => false,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::UInt(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::UInt(u64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<FieldMap> for Value {
    fn from(value: FieldMap) -> Self {
        Self::Message(value)
    }
}

/// Field number to value mapping, ordered by field number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    fields: BTreeMap<u32, Value>,
}

impl FieldMap {
    /// Empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `number` to `value`, replacing any previous value.
    pub fn insert(&mut self, number: u32, value: impl Into<Value>) {
        self.fields.insert(number, value.into());
    }

    /// Builder form of [`FieldMap::insert`].
    #[must_use]
    pub fn with(mut self, number: u32, value: impl Into<Value>) -> Self {
        self.insert(number, value);
        self
    }

    /// Append one occurrence to a repeated field.
    pub fn push(&mut self, number: u32, value: impl Into<Value>) {
        let value = value.into();
        match self.fields.get_mut(&number) {
            Some(Value::Repeated(items)) => items.push(value),
            _ => {
                self.fields.insert(number, Value::Repeated(vec![value]));
            },
        }
    }

    /// Raw value for `number`.
    pub fn get(&self, number: u32) -> Option<&Value> {
        self.fields.get(&number)
    }

    /// String value for `number`. `None` if absent or not a string.
    pub fn str(&self, number: u32) -> Option<&str> {
        match self.fields.get(&number) {
            Some(Value::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// String value for `number`, or the empty default.
    pub fn str_or_default(&self, number: u32) -> String {
        self.str(number).map(str::to_string).unwrap_or_default()
    }

    /// Integer value for `number`. `None` if absent or not an integer.
    pub fn uint(&self, number: u32) -> Option<u64> {
        match self.fields.get(&number) {
            Some(Value::UInt(v)) => Some(*v),
            _ => None,
        }
    }

    /// Boolean value for `number`, `false` when absent.
    pub fn flag(&self, number: u32) -> bool {
        match self.fields.get(&number) {
            Some(Value::Bool(b)) => *b,
            Some(Value::UInt(v)) => *v != 0,
            _ => false,
        }
    }

    /// Nested messages stored under `number`, in wire order.
    ///
    /// Yields a single item for a non-repeated message field.
    pub fn messages(&self, number: u32) -> Vec<&FieldMap> {
        match self.fields.get(&number) {
            Some(Value::Message(m)) => vec![m],
            Some(Value::Repeated(items)) => items
                .iter()
                .filter_map(|v| match v {
                    Value::Message(m) => Some(m),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Number of distinct fields present.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no fields are present.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate fields in ascending field-number order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &Value)> {
        self.fields.iter().map(|(k, v)| (*k, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_detected() {
        assert!(Value::from("").is_default());
        assert!(Value::from(0u64).is_default());
        assert!(Value::from(false).is_default());
        assert!(!Value::from("x").is_default());
        assert!(!Value::Message(FieldMap::new()).is_default());
    }

    #[test]
    fn push_builds_repeated_field() {
        let mut map = FieldMap::new();
        map.push(1, FieldMap::new().with(1, "a"));
        map.push(1, FieldMap::new().with(1, "b"));

        let items = map.messages(1);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].str(1), Some("a"));
        assert_eq!(items[1].str(1), Some("b"));
    }

    #[test]
    fn typed_accessors_ignore_mismatched_values() {
        let map = FieldMap::new().with(1, "text").with(2, 7u64).with(3, true);

        assert_eq!(map.str(1), Some("text"));
        assert_eq!(map.str(2), None);
        assert_eq!(map.uint(2), Some(7));
        assert_eq!(map.uint(1), None);
        assert!(map.flag(3));
        assert!(!map.flag(4));
        assert_eq!(map.str_or_default(9), "");
    }
}
