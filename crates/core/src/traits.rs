use crate::models::{BlobTags, IndexerStatus, Passage, RegulationChunk};
use crate::{IngestError, ModelError, SearchError};
use async_trait::async_trait;

#[async_trait]
pub trait ReportStore {
    /// Writes `bytes` under `blob_name`, replacing any existing blob.
    async fn put_blob(
        &self,
        blob_name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), IngestError>;

    async fn set_tags(&self, blob_name: &str, tags: &BlobTags) -> Result<(), IngestError>;
}

#[async_trait]
pub trait IndexerControl {
    async fn run_indexer(&self, indexer: &str) -> Result<(), IngestError>;

    async fn indexer_status(&self, indexer: &str) -> Result<IndexerStatus, IngestError>;
}

#[async_trait]
pub trait PassageIndex {
    /// Hybrid query restricted to chunks whose parent key equals `parent_key`.
    async fn search_report_passages(
        &self,
        parent_key: &str,
        top_n: usize,
    ) -> Result<Vec<Passage>, SearchError>;
}

#[async_trait]
pub trait RegulationIndex {
    async fn search_regulation_chunks(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RegulationChunk>, SearchError>;
}

#[async_trait]
pub trait Embedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError>;
}

#[async_trait]
pub trait ChatModel {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        max_completion_tokens: u32,
    ) -> Result<String, ModelError>;
}
