//! Line-delimited JSON record container.
//!
//! Layout:
//!
//! ```text
//! {"format":"dataset-layout/json","version":1,"compression":{...},"schema":{...}}\n
//! <body>
//! ```
//!
//! The header line is always plain text. The body holds one JSON object per
//! record, one per line, and is zstd-compressed as a single frame when the
//! header says so.

use std::{
    io::{BufRead, BufReader, BufWriter, Read, Write},
    marker::PhantomData,
};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use snafu::prelude::*;

use crate::format::{
    Compression, EncodeSnafu, FormatResult, HeaderSnafu, IoSnafu, JsonSnafu, MissingValueSnafu,
    RecordCodec, RecordReader, RecordWriter, ResolutionSnafu, ValueTypeSnafu,
};
use crate::schema::{FieldSource, FieldType, Schema, SchemaField, SchemaResolution};
use crate::storage::SyncWrite;
use crate::value::{Entity, FieldValue, Record};

/// Format tag written in every header.
pub const FORMAT_TAG: &str = "dataset-layout/json";

/// Newest container version this build writes and reads.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    format: String,
    version: u32,
    compression: Compression,
    schema: Schema,
}

/// Codec for the line-delimited JSON container.
///
/// Works for any entity type that exposes fields through [`Entity`] and can
/// be built from a [`Record`].
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRecordCodec;

impl<E> RecordCodec<E> for JsonRecordCodec
where
    E: Entity + From<Record> + 'static,
{
    fn extension(&self) -> &str {
        "jsonl"
    }

    fn writer(
        &self,
        out: Box<dyn SyncWrite>,
        schema: &Schema,
        compression: Compression,
    ) -> FormatResult<Box<dyn RecordWriter<E>>> {
        let mut out = BufWriter::new(out);
        let header = Header {
            format: FORMAT_TAG.to_string(),
            version: FORMAT_VERSION,
            compression,
            schema: schema.clone(),
        };
        serde_json::to_writer(&mut out, &header).context(EncodeSnafu)?;
        out.write_all(b"\n").context(IoSnafu {
            operation: "writing header",
        })?;

        let body = match compression {
            Compression::None => Body::Plain(out),
            Compression::Zstd { level } => Body::Zstd(
                zstd::stream::write::Encoder::new(out, level).context(IoSnafu {
                    operation: "starting zstd frame",
                })?,
            ),
        };

        Ok(Box::new(JsonRecordWriter {
            schema: schema.clone(),
            body,
            _entity: PhantomData,
        }))
    }

    fn reader(
        &self,
        input: Box<dyn Read + Send>,
        schema: &Schema,
    ) -> FormatResult<Box<dyn RecordReader<E>>> {
        let mut input = BufReader::new(input);
        let mut line = String::new();
        let n = input.read_line(&mut line).context(IoSnafu {
            operation: "reading header",
        })?;
        ensure!(
            n > 0,
            HeaderSnafu {
                message: "stream is empty",
            }
        );

        let header: Header = serde_json::from_str(&line).context(JsonSnafu { line: 1_usize })?;
        ensure!(
            header.format == FORMAT_TAG,
            HeaderSnafu {
                message: format!("unknown format tag '{}'", header.format),
            }
        );
        ensure!(
            header.version <= FORMAT_VERSION,
            HeaderSnafu {
                message: format!("unsupported version {}", header.version),
            }
        );

        let resolution =
            SchemaResolution::new(&header.schema, schema).context(ResolutionSnafu)?;

        let body: Box<dyn BufRead + Send> = match header.compression {
            Compression::None => Box::new(input),
            Compression::Zstd { .. } => Box::new(BufReader::new(
                zstd::stream::read::Decoder::with_buffer(input).context(IoSnafu {
                    operation: "opening zstd frame",
                })?,
            )),
        };

        Ok(Box::new(JsonRecordReader {
            resolution,
            body,
            line: 1,
            buf: String::new(),
            _entity: PhantomData,
        }))
    }
}

enum Body {
    Plain(BufWriter<Box<dyn SyncWrite>>),
    Zstd(zstd::stream::write::Encoder<'static, BufWriter<Box<dyn SyncWrite>>>),
}

impl Body {
    fn stream(&mut self) -> &mut dyn Write {
        match self {
            Body::Plain(w) => w,
            Body::Zstd(w) => w,
        }
    }
}

struct JsonRecordWriter<E> {
    schema: Schema,
    body: Body,
    _entity: PhantomData<fn(&E)>,
}

impl<E: Entity> RecordWriter<E> for JsonRecordWriter<E> {
    fn append(&mut self, entity: &E) -> FormatResult<()> {
        let mut object = Map::with_capacity(self.schema.fields().len());
        for field in self.schema.fields() {
            object.insert(field.name.clone(), encode_value(field, entity.get(&field.name))?);
        }

        let mut line = serde_json::to_vec(&Value::Object(object)).context(EncodeSnafu)?;
        line.push(b'\n');
        self.body.stream().write_all(&line).context(IoSnafu {
            operation: "appending record",
        })
    }

    fn flush(&mut self) -> FormatResult<()> {
        self.body.stream().flush().context(IoSnafu {
            operation: "flushing records",
        })
    }

    fn close(self: Box<Self>) -> FormatResult<()> {
        let buffered = match self.body {
            Body::Plain(w) => w,
            Body::Zstd(encoder) => encoder.finish().context(IoSnafu {
                operation: "finishing zstd frame",
            })?,
        };
        let mut out = buffered.into_inner().map_err(|e| e.into_error()).context(IoSnafu {
            operation: "flushing records",
        })?;
        out.sync_all().context(IoSnafu {
            operation: "syncing data file",
        })
    }
}

fn encode_value(field: &SchemaField, value: Option<&FieldValue>) -> FormatResult<Value> {
    let value = value.unwrap_or(&FieldValue::Null);
    let coerced = field.field_type.coerce(value).context(ValueTypeSnafu {
        field: field.name.clone(),
        expected: field.field_type,
        found: value.type_name(),
    })?;

    Ok(match coerced {
        FieldValue::Null => {
            ensure!(
                field.nullable,
                MissingValueSnafu {
                    field: field.name.clone(),
                }
            );
            Value::Null
        }
        FieldValue::Bool(b) => Value::Bool(b),
        FieldValue::Int(i) => Value::from(i),
        FieldValue::Long(l) => Value::from(l),
        FieldValue::Double(d) => Value::Number(Number::from_f64(d).context(ValueTypeSnafu {
            field: field.name.clone(),
            expected: field.field_type,
            found: format!("non-finite double {d}"),
        })?),
        FieldValue::String(s) => Value::String(s),
        FieldValue::Timestamp(ts) => Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
    })
}

struct JsonRecordReader<E> {
    resolution: SchemaResolution,
    body: Box<dyn BufRead + Send>,
    line: usize,
    buf: String,
    _entity: PhantomData<fn() -> E>,
}

impl<E: From<Record>> RecordReader<E> for JsonRecordReader<E> {
    fn next_record(&mut self) -> FormatResult<Option<E>> {
        loop {
            self.buf.clear();
            let n = self.body.read_line(&mut self.buf).context(IoSnafu {
                operation: "reading record",
            })?;
            if n == 0 {
                return Ok(None);
            }
            self.line += 1;
            if !self.buf.trim().is_empty() {
                break;
            }
        }

        let object: Map<String, Value> =
            serde_json::from_str(&self.buf).context(JsonSnafu { line: self.line })?;

        let mut record = Record::new();
        for (field, source) in self.resolution.plan() {
            let value = match source {
                FieldSource::Written { written } => {
                    decode_value(field, *written, object.get(&field.name))?
                }
                FieldSource::Default(value) => value.clone(),
            };
            record.set(field.name.clone(), value);
        }

        Ok(Some(E::from(record)))
    }
}

/// Decode a JSON value written as `written` into the reader field's type.
fn decode_value(
    field: &SchemaField,
    written: FieldType,
    raw: Option<&Value>,
) -> FormatResult<FieldValue> {
    let raw = match raw {
        None | Some(Value::Null) => {
            ensure!(
                field.nullable,
                MissingValueSnafu {
                    field: field.name.clone(),
                }
            );
            return Ok(FieldValue::Null);
        }
        Some(v) => v,
    };

    let typed = match written {
        FieldType::Bool => raw.as_bool().map(FieldValue::Bool),
        FieldType::Int => raw
            .as_i64()
            .and_then(|i| i32::try_from(i).ok())
            .map(FieldValue::Int),
        FieldType::Long => raw.as_i64().map(FieldValue::Long),
        FieldType::Double => raw.as_f64().map(FieldValue::Double),
        FieldType::String => raw.as_str().map(|s| FieldValue::String(s.to_string())),
        FieldType::Timestamp => raw
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|ts| FieldValue::Timestamp(ts.with_timezone(&Utc))),
    };
    let typed = typed.context(ValueTypeSnafu {
        field: field.name.clone(),
        expected: written,
        found: raw.to_string(),
    })?;

    field.field_type.coerce(&typed).context(ValueTypeSnafu {
        field: field.name.clone(),
        expected: field.field_type,
        found: typed.type_name(),
    })
}
