mod chunker;

pub use chunker::{Chunk, Chunker};
