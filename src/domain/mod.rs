//! Core data model (spec §3): File, Chunk, Session, QueryExpansion, RetrievalHit.

pub mod chunk;
pub mod expansion;
pub mod file;
pub mod retrieval;
pub mod session;

pub use chunk::{Chunk, ChunkLevel};
pub use expansion::QueryExpansion;
pub use file::{File, FileType, IndexingStatus};
pub use retrieval::RetrievalHit;
pub use session::{Message, MessageRole, Session};
