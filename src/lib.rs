//! # Usage Learn
//!
//! An on-device engine that learns from how generated code is used.
//!
//! Every completed generation, reasoned replacement, and object observation
//! is parsed into structural chunks, classified, and stored as a scored,
//! deduplicated record. Later prompts retrieve the best-matching records by
//! token overlap with the prompt that produced them.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────┐   ┌──────────────┐
//! │  Producers  │──▶│ LearningPipeline │──▶│ PatternStore │
//! │ ingest_*()  │   │ parse + classify │   │   (SQLite)   │
//! └─────────────┘   └──────────────────┘   └──────┬───────┘
//!                                                 │
//!                   ┌──────────────┐              ▼
//!                   │ModelRegistry │        ┌──────────┐
//!                   │  (kv_store)  │        │  search  │
//!                   └──────────────┘        └──────────┘
//! ```
//!
//! Domain logic (parser, classifier, diffing, record building, ranking)
//! lives in the `usage-learn-core` crate; this crate adds SQLite
//! persistence, configuration, the model registry, the worker pipeline,
//! and the `ulearn` CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//! | [`sqlite_store`] | SQLite pattern store and key/value store |
//! | [`model_registry`] | Classification-model descriptors and selection |
//! | [`pipeline`] | Background learning workers |
//! | [`engine`] | Wires the components together |
//! | [`search`], [`get`], [`stats`] | Read commands |
//! | [`learn_cmd`], [`classify_cmd`], [`models_cmd`] | CLI front-ends |

pub mod classify_cmd;
pub mod config;
pub mod db;
pub mod engine;
pub mod get;
pub mod learn_cmd;
pub mod migrate;
pub mod model_registry;
pub mod models_cmd;
pub mod pipeline;
pub mod search;
pub mod sqlite_store;
pub mod stats;
