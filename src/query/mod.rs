//! The query half of the pipeline: expand → retrieve → assemble → generate
//! (spec §4.2–§4.6), sequenced by `orchestrator`.

pub mod assembler;
pub mod expander;
pub mod orchestrator;
pub mod retriever;

use std::sync::OnceLock;

/// Token count for the `metadata` SSE event (spec §6.2), via the same
/// encoding the default model family uses.
pub fn token_count(text: &str) -> usize {
    static BPE: OnceLock<tiktoken_rs::CoreBPE> = OnceLock::new();
    let bpe = BPE.get_or_init(|| tiktoken_rs::cl100k_base().expect("cl100k_base encoding is bundled"));
    bpe.encode_ordinary(text).len()
}
