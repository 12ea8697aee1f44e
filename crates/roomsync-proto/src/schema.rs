//! Declarative field tables.
//!
//! Each protocol message is described by a static [`MessageSchema`]: a list
//! of field numbers with a name and a [`FieldKind`]. The generic codec in
//! [`crate::wire`] uses the table to interpret length-delimited bytes (string
//! or nested message) and varints (integer or bool). Fields absent from the
//! table are skipped.

/// How a field's value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// UTF-8 string (wire type 2)
    String,
    /// Unsigned integer (wire type 0)
    Varint,
    /// Boolean (wire type 0, non-zero is true)
    Bool,
    /// Nested message (wire type 2)
    Message(&'static MessageSchema),
}

impl FieldKind {
    /// Wire type bits this kind is carried with.
    pub const fn wire_bits(self) -> u8 {
        match self {
            Self::Varint | Self::Bool => 0,
            Self::String | Self::Message(_) => 2,
        }
    }
}

/// One entry of a field table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field number on the wire
    pub number: u32,
    /// Field name, for diagnostics
    pub name: &'static str,
    /// Value interpretation
    pub kind: FieldKind,
    /// Field may occur more than once
    pub repeated: bool,
}

impl FieldDescriptor {
    /// String field.
    pub const fn string(number: u32, name: &'static str) -> Self {
        Self { number, name, kind: FieldKind::String, repeated: false }
    }

    /// Unsigned integer field.
    pub const fn varint(number: u32, name: &'static str) -> Self {
        Self { number, name, kind: FieldKind::Varint, repeated: false }
    }

    /// Boolean field.
    pub const fn bool(number: u32, name: &'static str) -> Self {
        Self { number, name, kind: FieldKind::Bool, repeated: false }
    }

    /// Nested message field.
    pub const fn message(number: u32, name: &'static str, schema: &'static MessageSchema) -> Self {
        Self { number, name, kind: FieldKind::Message(schema), repeated: false }
    }

    /// Mark the field as repeated.
    #[must_use]
    pub const fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }
}

/// Field table for one message type.
#[derive(Debug, PartialEq, Eq)]
pub struct MessageSchema {
    /// Message type name, for diagnostics
    pub name: &'static str,
    /// Known fields
    pub fields: &'static [FieldDescriptor],
}

impl MessageSchema {
    /// Descriptor for `number`, if the field is known.
    pub fn field(&self, number: u32) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.number == number)
    }

    /// Descriptor for `name`, if the field is known.
    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}
