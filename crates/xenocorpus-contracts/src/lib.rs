pub mod annotation;
pub mod corpus;
pub mod jsonl;
mod lenient;
pub mod vocab;

pub use annotation::{AnnotationRecord, AnnotationTally};
pub use corpus::{corpus_id, CorpusRecord};
pub use jsonl::{JsonlRead, JsonlWriter};
