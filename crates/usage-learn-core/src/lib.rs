//! # Usage Learn Core
//!
//! Platform-neutral logic for usage-learn: data models, the rule-based
//! classifier, the structural parser, chunk diffing, prompt analysis,
//! record building, store traits, and retrieval ranking.
//!
//! This crate contains no tokio runtime, sqlx, or filesystem I/O. The
//! application crate supplies persistence, the model registry, and the
//! background learning pipeline on top of it.

pub mod classifier;
pub mod diff;
pub mod learning;
pub mod models;
pub mod parser;
pub mod prompt;
pub mod search;
pub mod store;
