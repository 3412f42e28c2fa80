//! Retrieval-augmented document question-answering service.
//!
//! The binary in `main.rs` only wires these modules into a running server;
//! everything else — chunking, retrieval, the orchestrator, the backing
//! service adapters — lives here so integration tests can exercise it
//! against fakes without a live Redis/SQLite/LanceDB/HTTP stack.

pub mod backing;
pub mod config;
pub mod domain;
pub mod error;
pub mod ids;
pub mod ingestion;
pub mod query;
pub mod web;
