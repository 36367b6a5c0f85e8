#![allow(missing_docs)]

use std::path::Path;
use std::sync::Arc;

use dataset_layout_core::{
    dataset::{
        DatasetReader, DatasetReaderError, DatasetWriter, FileSystemDatasetReader,
        FileSystemDatasetWriter, ReaderWriterState, WriterOptions,
    },
    descriptor::DatasetDescriptor,
    filesystem::{DatasetError, FileSystemDataset},
    format::{Compression, JsonRecordCodec},
    metadata::{FileSystemMetadataProvider, MetadataProvider},
    partition::PartitionStrategy,
    path_codec::PathCodecError,
    schema::{FieldType, Schema, SchemaField},
    storage::{LocalStorage, Storage, temp_path_for},
    value::{Entity, FieldValue, Record},
};
use tempfile::TempDir;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn storage() -> Arc<dyn Storage> {
    Arc::new(LocalStorage::new())
}

fn string_schema() -> Result<Schema, Box<dyn std::error::Error>> {
    Ok(Schema::new(
        "mystring",
        vec![SchemaField::required("text", FieldType::String)],
    )?)
}

fn user_schema() -> Result<Schema, Box<dyn std::error::Error>> {
    Ok(Schema::new(
        "user",
        vec![
            SchemaField::required("username", FieldType::String),
            SchemaField::required("email", FieldType::String),
        ],
    )?)
}

fn users_strategy() -> Result<PartitionStrategy, Box<dyn std::error::Error>> {
    Ok(PartitionStrategy::builder()
        .hash_from("username", "username_part", 2)
        .hash("email", 3)
        .build()?)
}

fn write_strings(path: &Path, n: usize, compression: Compression) -> TestResult {
    let mut writer = FileSystemDatasetWriter::<Record>::new(
        storage(),
        Arc::new(JsonRecordCodec),
        path,
        string_schema()?,
        WriterOptions::default().with_compression(compression),
    )?;
    writer.open()?;
    for i in 0..n {
        writer.write(&Record::new().with("text", format!("test-{i}")))?;
    }
    writer.close()?;
    Ok(())
}

#[test]
fn schema_evolution_fills_defaults() -> TestResult {
    let tmp = TempDir::new()?;
    for compression in [Compression::None, Compression::Zstd { level: 1 }] {
        let path = tmp.path().join(format!("strings-{compression}.jsonl"));
        write_strings(&path, 100, compression)?;

        let evolved = Schema::new(
            "mystring",
            vec![
                SchemaField::required("text", FieldType::String),
                SchemaField::required("text2", FieldType::String).with_default("N/A"),
            ],
        )?;
        let mut reader = FileSystemDatasetReader::<Record>::new(
            storage(),
            Arc::new(JsonRecordCodec),
            &path,
            evolved,
        );
        reader.open()?;

        let mut count = 0;
        while reader.has_next()? {
            let record = reader.read()?;
            assert_eq!(record.get("text"), Some(&FieldValue::from(format!("test-{count}"))));
            assert_eq!(record.get("text2"), Some(&FieldValue::from("N/A")));
            count += 1;
        }
        assert_eq!(count, 100);
        assert!(!reader.has_next()?);
        reader.close();
        reader.close();
    }
    Ok(())
}

#[test]
fn committed_file_replaces_nothing_and_leaves_no_temp() -> TestResult {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("out/strings.jsonl");
    write_strings(&path, 3, Compression::default())?;

    assert!(path.is_file());
    let temp = temp_path_for(&path).ok_or("no temp path")?;
    assert!(!temp.exists());

    // A second writer cannot clobber the committed file.
    let mut writer = FileSystemDatasetWriter::<Record>::new(
        storage(),
        Arc::new(JsonRecordCodec),
        &path,
        string_schema()?,
        WriterOptions::default(),
    )?;
    writer.open()?;
    writer.write(&Record::new().with("text", "late"))?;
    assert!(writer.close().is_err());
    assert!(!temp.exists());

    let mut reader = FileSystemDatasetReader::<Record>::new(
        storage(),
        Arc::new(JsonRecordCodec),
        &path,
        string_schema()?,
    );
    reader.open()?;
    assert_eq!(reader.by_ref().count(), 3);
    Ok(())
}

#[test]
fn reader_lifecycle_errors() -> TestResult {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("one.jsonl");
    write_strings(&path, 1, Compression::None)?;

    let mut reader = FileSystemDatasetReader::<Record>::new(
        storage(),
        Arc::new(JsonRecordCodec),
        &path,
        string_schema()?,
    );
    assert!(matches!(
        reader.read(),
        Err(DatasetReaderError::IllegalState {
            state: ReaderWriterState::New,
            ..
        })
    ));
    reader.close();
    reader.close();
    assert_eq!(reader.state(), ReaderWriterState::Closed);
    Ok(())
}

#[test]
fn partition_key_for_path_scenarios() -> TestResult {
    let tmp = TempDir::new()?;
    let dataset = FileSystemDataset::<Record>::new(
        storage(),
        Arc::new(JsonRecordCodec),
        "partitioned-users",
        tmp.path(),
        DatasetDescriptor::builder(user_schema()?)
            .partition_strategy(users_strategy()?)
            .build(),
    );

    let key = dataset.partition_key_for_path(&tmp.path().join("username_part=1/email=2"))?;
    assert_eq!(key.values(), [FieldValue::Int(1), FieldValue::Int(2)]);

    let codec_error = |path: &Path| match dataset.partition_key_for_path(path) {
        Err(DatasetError::PartitionPath { source, .. }) => Some(source),
        _ => None,
    };

    assert!(matches!(
        codec_error(Path::new("hdfs://namenode/")),
        Some(PathCodecError::DifferentVolume { .. })
    ));
    let parent = tmp.path().parent().ok_or("no parent")?;
    assert!(matches!(
        codec_error(&parent.join("bogus")),
        Some(PathCodecError::NotUnderRoot { .. })
    ));
    assert!(matches!(
        codec_error(&tmp.path().join("username_part=1/email=2/extra=3")),
        Some(PathCodecError::SegmentCount { expected: 2, actual: 3, .. })
    ));
    assert!(matches!(
        codec_error(&tmp.path().join("not_a_partition=1/email=2")),
        Some(PathCodecError::NameMismatch { position: 0, .. })
    ));
    assert!(matches!(
        codec_error(&tmp.path().join("username_part=1/email")),
        Some(PathCodecError::MalformedSegment { position: 1, .. })
    ));

    let single = FileSystemDataset::<Record>::new(
        storage(),
        Arc::new(JsonRecordCodec),
        "single",
        tmp.path(),
        DatasetDescriptor::builder(user_schema()?)
            .partition_strategy(
                PartitionStrategy::builder()
                    .hash_from("username", "username_part", 2)
                    .build()?,
            )
            .build(),
    );
    for (segment, expect_name_mismatch) in [("not_a_partition=1", true), ("username_part", false)] {
        let err = single
            .partition_key_for_path(&tmp.path().join(segment))
            .err()
            .ok_or("decode unexpectedly succeeded")?;
        let source = match err {
            DatasetError::PartitionPath { source, .. } => source,
            other => return Err(format!("unexpected error {other:?}").into()),
        };
        assert_eq!(
            matches!(source, PathCodecError::NameMismatch { .. }),
            expect_name_mismatch,
            "{segment}: {source:?}"
        );
    }
    Ok(())
}

#[test]
fn repository_round_trip_through_metadata() -> TestResult {
    let tmp = TempDir::new()?;
    let provider = FileSystemMetadataProvider::new(storage(), tmp.path());
    let strategy = users_strategy()?;
    provider.save(
        "users",
        &DatasetDescriptor::builder(user_schema()?)
            .partition_strategy(strategy.clone())
            .build(),
    )?;

    let dataset = FileSystemDataset::<Record>::load(&provider, Arc::new(JsonRecordCodec), "users")?;
    assert_eq!(dataset.descriptor().partition_strategy(), Some(&strategy));

    let users: Vec<Record> = (0..20)
        .map(|i| {
            Record::new()
                .with("username", format!("user{i}"))
                .with("email", format!("user{i}@example.com"))
        })
        .collect();
    for user in &users {
        let mut writer = dataset.partition_writer(&strategy.key_for(user)?)?;
        writer.open()?;
        writer.write(user)?;
        writer.close()?;
    }

    let files = dataset.data_files()?;
    assert_eq!(files.len(), users.len());
    for file in &files {
        let dir = file.parent().ok_or("data file without parent")?;
        let key = dataset.partition_key_for_path(dir)?;
        assert_eq!(key.len(), 2);
    }
    assert!(dataset.partition_keys()?.len() <= 6);

    let mut read = 0;
    for mut reader in dataset.new_readers()? {
        reader.open()?;
        while reader.has_next()? {
            let record = reader.read()?;
            assert!(users.contains(&record));
            read += 1;
        }
        reader.close();
    }
    assert_eq!(read, users.len());

    assert!(provider.delete("users")?);
    assert!(!provider.exists("users")?);
    Ok(())
}
