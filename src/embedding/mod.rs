// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - turns query text into vectors
//!
//! This module defines the provider interface used by the index builder and
//! the retriever, plus the concrete providers and a retrying wrapper.

pub mod provider;
pub mod retry;

pub use provider::{
    create_provider, CommandProvider, EmbeddingProvider, EmbeddingProviderConfig, FastEmbedder,
    HashingProvider,
};
pub use retry::RetryingProvider;
