//! Record schemas and writer/reader schema resolution.
//!
//! A [`Schema`] is embedded in every data file by the writer. A reader may
//! declare a different schema; [`SchemaResolution`] decides, field by field,
//! how a record written with one schema is projected onto the other:
//!
//! - fields present in both must have compatible types (identical, or a
//!   lossless promotion `Int -> Long`, `Int -> Double`, `Long -> Double`);
//! - fields only in the reader schema take their declared default, or null
//!   when the field is nullable and has no default;
//! - fields only in the writer schema are dropped.

use std::{collections::HashSet, fmt};

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::value::FieldValue;

/// Result alias for schema construction and resolution.
pub type SchemaResult<T> = Result<T, SchemaError>;

/// Errors raised when building or resolving schemas.
#[derive(Debug, Snafu, Clone, PartialEq)]
#[snafu(visibility(pub(crate)))]
pub enum SchemaError {
    /// The schema has no name.
    #[snafu(display("schema name must not be empty"))]
    EmptyName,

    /// Two fields share a name.
    #[snafu(display("duplicate field '{field}' in schema '{schema}'"))]
    DuplicateField {
        /// Schema name.
        schema: String,
        /// Repeated field name.
        field: String,
    },

    /// A default value does not match the declared field type.
    #[snafu(display("default for field '{field}' must be {expected}, found {found}"))]
    InvalidDefault {
        /// Field name.
        field: String,
        /// Declared field type.
        expected: FieldType,
        /// Type label of the supplied default.
        found: &'static str,
    },

    /// A reader-only field has no default and is not nullable.
    #[snafu(display(
        "reader field '{field}' is absent from the written data and declares no default"
    ))]
    MissingDefault {
        /// Field name.
        field: String,
    },

    /// A field exists in both schemas with incompatible types.
    #[snafu(display(
        "field '{field}' was written as {writer_type} and cannot be read as {reader_type}"
    ))]
    TypeMismatch {
        /// Field name.
        field: String,
        /// Type in the writer schema.
        writer_type: FieldType,
        /// Type in the reader schema.
        reader_type: FieldType,
    },

    /// A reader field is non-nullable but the writer allowed nulls.
    #[snafu(display("field '{field}' is nullable in the written data but required by the reader"))]
    NullabilityMismatch {
        /// Field name.
        field: String,
    },
}

/// Logical type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    /// Boolean.
    Bool,
    /// 32-bit signed integer.
    Int,
    /// 64-bit signed integer.
    Long,
    /// 64-bit floating point.
    Double,
    /// UTF-8 string.
    String,
    /// UTC timestamp (RFC 3339 on disk).
    Timestamp,
}

impl FieldType {
    /// Look up a type by its display name (`"long"`, `"timestamp"`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "bool" => Some(FieldType::Bool),
            "int" => Some(FieldType::Int),
            "long" => Some(FieldType::Long),
            "double" => Some(FieldType::Double),
            "string" => Some(FieldType::String),
            "timestamp" => Some(FieldType::Timestamp),
            _ => None,
        }
    }

    /// True if `value` is an instance of this type (nulls excluded).
    pub fn accepts(self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (FieldType::Bool, FieldValue::Bool(_))
                | (FieldType::Int, FieldValue::Int(_))
                | (FieldType::Long, FieldValue::Long(_))
                | (FieldType::Double, FieldValue::Double(_))
                | (FieldType::String, FieldValue::String(_))
                | (FieldType::Timestamp, FieldValue::Timestamp(_))
        )
    }

    /// True if data written as `self` can be read as `reader`.
    pub fn promotes_to(self, reader: FieldType) -> bool {
        self == reader
            || matches!(
                (self, reader),
                (FieldType::Int, FieldType::Long)
                    | (FieldType::Int, FieldType::Double)
                    | (FieldType::Long, FieldType::Double)
            )
    }

    /// Convert `value` to this type if it is an instance of it or promotes
    /// to it. Nulls pass through.
    pub fn coerce(self, value: &FieldValue) -> Option<FieldValue> {
        match (self, value) {
            (_, FieldValue::Null) => Some(FieldValue::Null),
            (FieldType::Long, FieldValue::Int(i)) => Some(FieldValue::Long(i64::from(*i))),
            (FieldType::Double, FieldValue::Int(i)) => Some(FieldValue::Double(f64::from(*i))),
            (FieldType::Double, FieldValue::Long(l)) => Some(FieldValue::Double(*l as f64)),
            (t, v) if t.accepts(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FieldType::Bool => "bool",
            FieldType::Int => "int",
            FieldType::Long => "long",
            FieldType::Double => "double",
            FieldType::String => "string",
            FieldType::Timestamp => "timestamp",
        };
        f.write_str(s)
    }
}

/// One named, typed field of a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    /// Field name.
    pub name: String,
    /// Logical type.
    pub field_type: FieldType,
    /// Whether null is a legal value.
    #[serde(default)]
    pub nullable: bool,
    /// Value used when reading data written without this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<FieldValue>,
}

impl SchemaField {
    /// A non-nullable field without default.
    pub fn required(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: false,
            default: None,
        }
    }

    /// A nullable field without default.
    pub fn optional(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            nullable: true,
            ..Self::required(name, field_type)
        }
    }

    /// Attach a default value.
    pub fn with_default(mut self, value: impl Into<FieldValue>) -> Self {
        self.default = Some(value.into());
        self
    }
}

/// Named, ordered list of fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSchema", into = "RawSchema")]
pub struct Schema {
    name: String,
    fields: Vec<SchemaField>,
}

#[derive(Serialize, Deserialize)]
struct RawSchema {
    name: String,
    fields: Vec<SchemaField>,
}

impl TryFrom<RawSchema> for Schema {
    type Error = SchemaError;

    fn try_from(raw: RawSchema) -> Result<Self, Self::Error> {
        Schema::new(raw.name, raw.fields)
    }
}

impl From<Schema> for RawSchema {
    fn from(schema: Schema) -> Self {
        RawSchema {
            name: schema.name,
            fields: schema.fields,
        }
    }
}

impl Schema {
    /// Validate and build a schema.
    pub fn new(name: impl Into<String>, fields: Vec<SchemaField>) -> SchemaResult<Self> {
        let name = name.into();
        ensure!(!name.is_empty(), EmptyNameSnafu);

        let mut seen = HashSet::new();
        for field in &fields {
            ensure!(
                seen.insert(field.name.as_str()),
                DuplicateFieldSnafu {
                    schema: name.clone(),
                    field: field.name.clone(),
                }
            );
            if let Some(default) = &field.default {
                let ok = match default {
                    FieldValue::Null => field.nullable,
                    v => field.field_type.accepts(v),
                };
                ensure!(
                    ok,
                    InvalidDefaultSnafu {
                        field: field.name.clone(),
                        expected: field.field_type,
                        found: default.type_name(),
                    }
                );
            }
        }

        Ok(Self { name, fields })
    }

    /// Schema name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fields in declaration order.
    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.name)?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            let q = if field.nullable { "?" } else { "" };
            write!(f, " {}{q}: {}", field.name, field.field_type)?;
        }
        write!(f, " }}")
    }
}

/// How one reader field is populated.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldSource {
    /// Read from the written field, promoting from `written` if needed.
    Written {
        /// Type the data was written with.
        written: FieldType,
    },
    /// Absent from the written data; use this value.
    Default(FieldValue),
}

/// Projection plan from a writer schema onto a reader schema.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaResolution {
    reader: Schema,
    sources: Vec<FieldSource>,
}

impl SchemaResolution {
    /// Resolve `writer` against `reader`, failing on incompatible fields.
    pub fn new(writer: &Schema, reader: &Schema) -> SchemaResult<Self> {
        let sources = reader
            .fields()
            .iter()
            .map(|rf| -> SchemaResult<FieldSource> {
                let Some(wf) = writer.field(&rf.name) else {
                    return match (&rf.default, rf.nullable) {
                        (Some(default), _) => Ok(FieldSource::Default(default.clone())),
                        (None, true) => Ok(FieldSource::Default(FieldValue::Null)),
                        (None, false) => MissingDefaultSnafu {
                            field: rf.name.clone(),
                        }
                        .fail(),
                    };
                };
                ensure!(
                    wf.field_type.promotes_to(rf.field_type),
                    TypeMismatchSnafu {
                        field: rf.name.clone(),
                        writer_type: wf.field_type,
                        reader_type: rf.field_type,
                    }
                );
                ensure!(
                    !wf.nullable || rf.nullable,
                    NullabilityMismatchSnafu {
                        field: rf.name.clone(),
                    }
                );
                Ok(FieldSource::Written {
                    written: wf.field_type,
                })
            })
            .collect::<SchemaResult<Vec<_>>>()?;

        Ok(Self {
            reader: reader.clone(),
            sources,
        })
    }

    /// The schema records are produced in.
    pub fn reader_schema(&self) -> &Schema {
        &self.reader
    }

    /// Reader fields paired with how each is populated.
    pub fn plan(&self) -> impl Iterator<Item = (&SchemaField, &FieldSource)> {
        self.reader.fields().iter().zip(self.sources.iter())
    }
}
