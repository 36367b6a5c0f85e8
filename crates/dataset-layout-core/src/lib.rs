//! Core engine for partitioned, file-based datasets.
//!
//! This crate provides the building blocks of `dataset-layout`:
//!
//! - Field partitioners and partition strategies that map an entity to an
//!   ordered partition key (`partition` module).
//! - A small expression language that serializes strategies to text and
//!   parses them back, with a bounded evaluation cache (`expression` module).
//! - A codec between partition keys and `name=value/...` directory paths
//!   (`path_codec` module).
//! - Atomic, temp-then-rename dataset writers and use-once readers that
//!   tolerate schema evolution (`dataset` module).
//! - The storage and record-format capabilities those components are built
//!   on, with local-filesystem and line-delimited JSON implementations
//!   (`storage` and `format` modules).
//! - Descriptor persistence and filesystem datasets tying the pieces
//!   together (`descriptor`, `metadata` and `filesystem` modules).
//!
//! All I/O is blocking. Components do not synchronize internally; share a
//! storage handle across threads, but give each thread its own writers and
//! readers.
#![deny(missing_docs)]
pub mod dataset;
pub mod descriptor;
pub mod expression;
pub mod filesystem;
pub mod format;
pub mod metadata;
pub mod partition;
pub mod path_codec;
pub mod schema;
pub mod storage;
pub mod value;
