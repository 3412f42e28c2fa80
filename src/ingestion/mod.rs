//! Ingestion Pipeline (C7, spec §4.1): validate → extract → hierarchically
//! chunk → enrich → embed → insert.

pub mod chunker;
pub mod extract;
pub mod pipeline;
