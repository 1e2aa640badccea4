pub mod acquisition;
pub mod compare;
pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod render;
pub mod retrieval;
pub mod stores;
pub mod traits;

pub use acquisition::{
    extract_collection_links, AcquisitionSummary, DocumentFetcher, DownloadOutcome,
    RegulationSource, TransferProgress, EBA_DOCUMENTS, FIVA_COLLECTION_PAGE,
};
pub use compare::{build_prompt, compare, parse_analysis};
pub use config::{ServiceConfig, Services};
pub use error::{AcquireError, IngestError, ModelError, RenderError, SearchError};
pub use ingest::{
    report_identity, trigger_index_and_wait, trigger_index_and_wait_with, upload_report,
    DEFAULT_POLL_INTERVAL,
};
pub use models::{
    Analysis, BlobTags, ComparisonDepth, ComparisonResult, ComparisonRun, IndexerState,
    IndexerStatus, Passage, RegulationChunk, StructuredAnalysis, UploadedReport,
};
pub use orchestrator::ComparisonCoordinator;
pub use render::{format_console, render, render_at, RenderedReport};
pub use retrieval::{get_regulation_chunks, get_report_passages, ReportLocator};
pub use stores::{
    AzureBlobStore, AzureOpenAiClient, AzureSearchClient, ModelDeployments, SearchIndexes,
    StorageConnection,
};
pub use traits::{ChatModel, Embedder, IndexerControl, PassageIndex, RegulationIndex, ReportStore};
