// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector index over embedded corpus entries
//!
//! The index is built once per corpus from a batch embedding pass, queried
//! read-only by any number of concurrent retrievals, and persisted to SQLite.

pub mod builder;
pub mod metric;
pub mod store;
pub mod vector;

/// Layout version of persisted indices.
pub const SCHEMA_VERSION: u32 = 1;

pub use builder::IndexBuilder;
pub use metric::{cosine_similarity, DistanceMetric};
pub use store::IndexStore;
pub use vector::{Candidate, CorpusEntry, IndexSnapshot, IndexVersion, VectorIndex};
