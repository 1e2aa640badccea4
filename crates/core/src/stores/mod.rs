pub mod blob;
pub mod openai;
pub mod search;

pub use blob::{AzureBlobStore, StorageConnection};
pub use openai::{AzureOpenAiClient, ModelDeployments};
pub use search::{AzureSearchClient, SearchIndexes, DEFAULT_SEARCH_API_VERSION};
