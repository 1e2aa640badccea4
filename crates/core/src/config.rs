use crate::retrieval::ReportLocator;
use crate::stores::{
    AzureBlobStore, AzureOpenAiClient, AzureSearchClient, ModelDeployments, SearchIndexes,
};
use crate::IngestError;

/// Everything needed to reach the managed services for one run.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub storage_connection_string: String,
    pub storage_account: String,
    pub report_container: String,
    pub search_endpoint: String,
    pub search_key: String,
    pub search_api_version: String,
    pub report_index: String,
    pub regulation_index: String,
    pub report_semantic_configuration: String,
    pub report_indexer: String,
    pub openai_endpoint: String,
    pub openai_key: String,
    pub openai_api_version: String,
    pub embedding_deployment: String,
    pub chat_deployment: String,
}

/// Clients built once at startup and handed to each stage.
pub struct Services {
    pub blob: AzureBlobStore,
    pub indexer: AzureSearchClient,
    pub report_search: AzureSearchClient,
    pub regulation_search: AzureSearchClient,
    pub embedder: AzureOpenAiClient,
    pub chat: AzureOpenAiClient,
    pub locator: ReportLocator,
}

impl ServiceConfig {
    fn search_client(&self) -> AzureSearchClient {
        AzureSearchClient::new(
            &self.search_endpoint,
            &self.search_key,
            &self.search_api_version,
            SearchIndexes {
                report_index: self.report_index.clone(),
                regulation_index: self.regulation_index.clone(),
                semantic_configuration: self.report_semantic_configuration.clone(),
            },
        )
    }

    fn openai_client(&self) -> AzureOpenAiClient {
        AzureOpenAiClient::new(
            &self.openai_endpoint,
            &self.openai_key,
            &self.openai_api_version,
            ModelDeployments {
                chat: self.chat_deployment.clone(),
                embedding: self.embedding_deployment.clone(),
            },
        )
    }
}

impl Services {
    pub fn connect(config: &ServiceConfig) -> Result<Self, IngestError> {
        Ok(Self {
            blob: AzureBlobStore::from_connection_string(
                &config.storage_connection_string,
                &config.report_container,
            )?,
            indexer: config.search_client(),
            report_search: config.search_client(),
            regulation_search: config.search_client(),
            embedder: config.openai_client(),
            chat: config.openai_client(),
            locator: ReportLocator {
                storage_account: config.storage_account.clone(),
                container: config.report_container.clone(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ServiceConfig {
        ServiceConfig {
            storage_connection_string: "AccountName=esgstore;SharedAccessSignature=sv=1&sig=x"
                .to_string(),
            storage_account: "esgstore".to_string(),
            report_container: "reports".to_string(),
            search_endpoint: "https://search.example.net".to_string(),
            search_key: "key".to_string(),
            search_api_version: "2024-07-01".to_string(),
            report_index: "reports-idx".to_string(),
            regulation_index: "regulation-idx".to_string(),
            report_semantic_configuration: "reports-semantic-configuration".to_string(),
            report_indexer: "reports-indexer".to_string(),
            openai_endpoint: "https://openai.example.net".to_string(),
            openai_key: "key".to_string(),
            openai_api_version: "2024-10-21".to_string(),
            embedding_deployment: "embed".to_string(),
            chat_deployment: "chat".to_string(),
        }
    }

    #[test]
    fn connect_builds_locator_from_account_and_container() {
        let services = Services::connect(&config()).expect("valid config");
        assert_eq!(
            services.locator.blob_url("report1"),
            "https://esgstore.blob.core.windows.net/reports/report1.pdf"
        );
    }

    #[test]
    fn connect_rejects_unusable_connection_string() {
        let mut config = config();
        config.storage_connection_string = "AccountName=esgstore;AccountKey=abc".to_string();
        assert!(matches!(
            Services::connect(&config),
            Err(IngestError::InvalidConnectionString(_))
        ));
    }
}
