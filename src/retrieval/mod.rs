// Retrieval: in-memory lexical index and the query service on top of it

pub mod index;
pub mod service;

pub use index::{DocumentIndex, FragmentAttributes, IndexFragment, QueryResult, SourceSummary};
pub use service::{Retrieval, RetrievalAnswer, RetrievalService, SourceCitation};
