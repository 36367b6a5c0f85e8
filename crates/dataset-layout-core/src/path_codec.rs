//! Mapping between partition keys and directory paths.
//!
//! A key for a strategy with partitioners `p0..pn` is stored under
//! `p0.name=v0/p1.name=v1/.../pn.name=vn`, where each `vi` is the display
//! form of the bucket value. Decoding is strict: the candidate path must sit
//! on the same volume as the root, below the root, with exactly one segment
//! per partitioner, each naming the matching partitioner and holding a value
//! that partitioner can parse.

use std::{
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use snafu::prelude::*;

use crate::partition::{PartitionError, PartitionKey, PartitionStrategy};
use crate::storage::Storage;

/// Result alias for path codec operations.
pub type PathCodecResult<T> = Result<T, PathCodecError>;

/// Reasons a key cannot be encoded or a path cannot be decoded.
#[derive(Debug, Snafu, Clone, PartialEq)]
#[snafu(visibility(pub(crate)))]
pub enum PathCodecError {
    /// The key does not have one value per partitioner.
    #[snafu(display("key has {actual} values but the strategy has {expected} partitioners"))]
    KeyLength {
        /// Partitioner count.
        expected: usize,
        /// Key length.
        actual: usize,
    },

    /// A bucket value cannot be represented as a single directory segment.
    #[snafu(display("value '{value}' of partition '{name}' is not a valid directory name"))]
    UnencodableValue {
        /// Partitioner name.
        name: String,
        /// Display form of the value.
        value: String,
    },

    /// The candidate lives on a different storage volume than the root.
    #[snafu(display("{} is not on the same volume as {}", path.display(), root.display()))]
    DifferentVolume {
        /// Dataset root.
        root: PathBuf,
        /// Candidate path.
        path: PathBuf,
    },

    /// The candidate is not a descendant of the root.
    #[snafu(display("{} is not under {}", path.display(), root.display()))]
    NotUnderRoot {
        /// Dataset root.
        root: PathBuf,
        /// Candidate path.
        path: PathBuf,
    },

    /// The candidate has the wrong number of segments below the root.
    #[snafu(display(
        "{} has {actual} partition directories below the root, expected {expected}",
        path.display()
    ))]
    SegmentCount {
        /// Candidate path.
        path: PathBuf,
        /// Partitioner count.
        expected: usize,
        /// Segments found.
        actual: usize,
    },

    /// A segment is not of the form `name=value`.
    #[snafu(display("segment '{segment}' at position {position} is not of the form name=value"))]
    MalformedSegment {
        /// Zero-based segment index.
        position: usize,
        /// The offending segment.
        segment: String,
    },

    /// A segment names a different field than the partitioner at its position.
    #[snafu(display("segment at position {position} names '{found}', expected '{expected}'"))]
    NameMismatch {
        /// Zero-based segment index.
        position: usize,
        /// Partitioner name at that position.
        expected: String,
        /// Name found in the path.
        found: String,
    },

    /// A segment value is rejected by its partitioner.
    #[snafu(display("invalid value in segment {position}: {source}"))]
    InvalidValue {
        /// Zero-based segment index.
        position: usize,
        /// Partitioner error.
        source: PartitionError,
    },
}

/// Encodes partition keys as relative paths and decodes them back.
#[derive(Debug, Clone)]
pub struct PartitionPathCodec {
    storage: Arc<dyn Storage>,
}

impl PartitionPathCodec {
    /// Codec that checks volumes through `storage`.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Relative directory path for `key`.
    pub fn encode(&self, strategy: &PartitionStrategy, key: &PartitionKey) -> PathCodecResult<PathBuf> {
        encode(strategy, key)
    }

    /// Recover the key of the partition directory `candidate` under `root`.
    pub fn decode(
        &self,
        strategy: &PartitionStrategy,
        root: &Path,
        candidate: &Path,
    ) -> PathCodecResult<PartitionKey> {
        ensure!(
            self.storage.same_volume(root, candidate),
            DifferentVolumeSnafu {
                root,
                path: candidate,
            }
        );
        let relative = candidate.strip_prefix(root).ok().context(NotUnderRootSnafu {
            root,
            path: candidate,
        })?;

        let segments: Vec<Component<'_>> = relative
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect();
        ensure!(
            segments.len() == strategy.len(),
            SegmentCountSnafu {
                path: candidate,
                expected: strategy.len(),
                actual: segments.len(),
            }
        );

        let mut values = Vec::with_capacity(segments.len());
        for (position, (component, fp)) in segments
            .iter()
            .zip(strategy.field_partitioners())
            .enumerate()
        {
            let segment = component.as_os_str().to_string_lossy();
            let (name, value) = match (component, segment.split_once('=')) {
                (Component::Normal(_), Some((name, value))) if !name.is_empty() && !value.is_empty() => {
                    (name, value)
                }
                _ => {
                    return MalformedSegmentSnafu {
                        position,
                        segment: segment.into_owned(),
                    }
                    .fail();
                }
            };
            ensure!(
                name == fp.name(),
                NameMismatchSnafu {
                    position,
                    expected: fp.name(),
                    found: name,
                }
            );
            values.push(fp.parse(value).context(InvalidValueSnafu { position })?);
        }

        strategy.partition_key(values).map_err(|_| {
            KeyLengthSnafu {
                expected: strategy.len(),
                actual: segments.len(),
            }
            .build()
        })
    }
}

/// Relative directory path for `key` under `strategy`.
///
/// Does not touch storage, so it is available without a codec instance.
pub fn encode(strategy: &PartitionStrategy, key: &PartitionKey) -> PathCodecResult<PathBuf> {
    ensure!(
        key.len() == strategy.len(),
        KeyLengthSnafu {
            expected: strategy.len(),
            actual: key.len(),
        }
    );

    let mut path = PathBuf::new();
    for (fp, value) in strategy.field_partitioners().iter().zip(key.values()) {
        let text = value.to_string();
        ensure!(
            !text.is_empty() && text != "." && text != ".." && !text.contains(['/', '\\']),
            UnencodableValueSnafu {
                name: fp.name(),
                value: text,
            }
        );
        path.push(format!("{}={}", fp.name(), text));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use crate::storage::LocalStorage;
    use crate::value::{FieldValue, Record};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn strategy() -> PartitionStrategy {
        PartitionStrategy::builder()
            .hash_from("username", "username_part", 2)
            .hash("email", 3)
            .build()
            .unwrap()
    }

    fn codec() -> PartitionPathCodec {
        PartitionPathCodec::new(Arc::new(LocalStorage::new()))
    }

    #[test]
    fn encode_joins_segments_in_strategy_order() -> TestResult {
        let s = strategy();
        let key = s.partition_key(vec![FieldValue::Int(1), FieldValue::Int(2)])?;
        assert_eq!(codec().encode(&s, &key)?, PathBuf::from("username_part=1/email=2"));
        Ok(())
    }

    #[test]
    fn encode_rejects_unrepresentable_values() -> TestResult {
        let s = PartitionStrategy::builder().identity("dir", 0).build()?;
        let key = s.partition_key(vec![FieldValue::from("a/b")])?;
        assert!(matches!(
            encode(&s, &key),
            Err(PathCodecError::UnencodableValue { .. })
        ));
        let key = s.partition_key(vec![FieldValue::from("")])?;
        assert!(encode(&s, &key).is_err());
        Ok(())
    }

    #[test]
    fn decode_inverts_encode() -> TestResult {
        let tmp = TempDir::new()?;
        let s = strategy();
        let entity = Record::new().with("username", "alice").with("email", "a@example.com");
        let key = s.key_for(&entity)?;

        let path = tmp.path().join(encode(&s, &key)?);
        assert_eq!(codec().decode(&s, tmp.path(), &path)?, key);
        Ok(())
    }

    #[test]
    fn decode_restores_typed_identity_values() -> TestResult {
        let tmp = TempDir::new()?;
        let s = PartitionStrategy::builder()
            .identity_typed("id", FieldType::Long, 0)
            .identity_typed("seen", FieldType::Timestamp, 0)
            .identity_typed("active", FieldType::Bool, 2)
            .hash("id", 4)
            .build()?;
        let seen = Utc.timestamp_millis_opt(1_371_081_601_123).single().ok_or("bad ts")?;
        let entity = Record::new()
            .with("id", 5i64)
            .with("seen", seen)
            .with("active", true);
        let key = s.key_for(&entity)?;
        assert_eq!(key.get(0), Some(&FieldValue::Long(5)));

        let path = tmp.path().join(encode(&s, &key)?);
        assert_eq!(codec().decode(&s, tmp.path(), &path)?, key);
        Ok(())
    }

    #[test]
    fn path_errors_render_both_paths() {
        let err = PathCodecError::NotUnderRoot {
            root: PathBuf::from("/data/users"),
            path: PathBuf::from("/data/bogus"),
        };
        assert_eq!(err.to_string(), "/data/bogus is not under /data/users");

        let err = PathCodecError::SegmentCount {
            path: PathBuf::from("/data/users/a=1"),
            expected: 2,
            actual: 1,
        };
        assert!(err.to_string().starts_with("/data/users/a=1 has 1 partition"));
    }

    #[test]
    fn decode_rejects_wrong_name() -> TestResult {
        let tmp = TempDir::new()?;
        let s = PartitionStrategy::builder()
            .hash_from("username", "username_part", 2)
            .build()?;
        let err = codec()
            .decode(&s, tmp.path(), &tmp.path().join("not_a_partition=1"))
            .unwrap_err();
        assert!(matches!(err, PathCodecError::NameMismatch { position: 0, .. }), "{err:?}");
        Ok(())
    }

    #[test]
    fn decode_rejects_extra_and_missing_segments() -> TestResult {
        let tmp = TempDir::new()?;
        let s = strategy();
        let err = codec()
            .decode(&s, tmp.path(), &tmp.path().join("username_part=1/email=2/extra=3"))
            .unwrap_err();
        assert!(
            matches!(err, PathCodecError::SegmentCount { expected: 2, actual: 3, .. }),
            "{err:?}"
        );

        let err = codec()
            .decode(&s, tmp.path(), &tmp.path().join("username_part=1"))
            .unwrap_err();
        assert!(matches!(err, PathCodecError::SegmentCount { actual: 1, .. }));
        Ok(())
    }

    #[test]
    fn decode_rejects_missing_or_unparseable_value() -> TestResult {
        let tmp = TempDir::new()?;
        let s = strategy();
        let err = codec()
            .decode(&s, tmp.path(), &tmp.path().join("username_part=/email=2"))
            .unwrap_err();
        assert!(matches!(err, PathCodecError::MalformedSegment { position: 0, .. }));

        let err = codec()
            .decode(&s, tmp.path(), &tmp.path().join("username_part=1/email"))
            .unwrap_err();
        assert!(matches!(err, PathCodecError::MalformedSegment { position: 1, .. }));

        let err = codec()
            .decode(&s, tmp.path(), &tmp.path().join("username_part=x/email=2"))
            .unwrap_err();
        assert!(matches!(err, PathCodecError::InvalidValue { position: 0, .. }));
        Ok(())
    }

    #[test]
    fn decode_rejects_paths_outside_root() -> TestResult {
        let tmp = TempDir::new()?;
        let root = tmp.path().join("root");
        let s = strategy();

        let outside = tmp.path().join("elsewhere/username_part=1/email=2");
        let err = codec().decode(&s, &root, &outside).unwrap_err();
        assert!(matches!(err, PathCodecError::NotUnderRoot { .. }));

        let remote = Path::new("hdfs://namenode/root/username_part=1/email=2");
        let err = codec().decode(&s, &root, remote).unwrap_err();
        assert!(matches!(err, PathCodecError::DifferentVolume { .. }));
        Ok(())
    }
}
