use crate::models::{IndexerStatus, Passage, RegulationChunk};
use crate::traits::{IndexerControl, PassageIndex, RegulationIndex};
use crate::{IngestError, SearchError};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

pub const DEFAULT_SEARCH_API_VERSION: &str = "2024-07-01";

/// Topic prompt vectorized by the service when ranking report chunks.
pub const ESG_TOPIC_QUERY: &str =
    "Find sections that discuss environmental metrics, social impact, or governance disclosures.";

const VECTOR_FIELD: &str = "text_vector";

#[derive(Debug, Clone)]
pub struct SearchIndexes {
    pub report_index: String,
    pub regulation_index: String,
    pub semantic_configuration: String,
}

pub struct AzureSearchClient {
    client: Client,
    endpoint: String,
    api_key: String,
    api_version: String,
    indexes: SearchIndexes,
}

impl AzureSearchClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        api_version: impl Into<String>,
        indexes: SearchIndexes,
    ) -> Self {
        let endpoint: String = endpoint.into();
        Self {
            client: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            api_version: api_version.into(),
            indexes,
        }
    }

    fn search_url(&self, index: &str) -> String {
        format!(
            "{}/indexes/{}/docs/search?api-version={}",
            self.endpoint, index, self.api_version
        )
    }

    fn indexer_url(&self, indexer: &str, action: &str) -> String {
        format!(
            "{}/indexers/{}/{}?api-version={}",
            self.endpoint, indexer, action, self.api_version
        )
    }

    async fn search(&self, index: &str, body: &Value) -> Result<Vec<Value>, SearchError> {
        let response = self
            .client
            .post(self.search_url(index))
            .header("api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let details = response.text().await.unwrap_or_default();
            return Err(SearchError::BackendResponse {
                backend: "azure-search".to_string(),
                details: format!("{status}: {details}"),
            });
        }

        let parsed: Value = response.json().await?;
        Ok(parsed
            .pointer("/value")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl PassageIndex for AzureSearchClient {
    async fn search_report_passages(
        &self,
        parent_key: &str,
        top_n: usize,
    ) -> Result<Vec<Passage>, SearchError> {
        let body = report_query_body(parent_key, top_n, &self.indexes.semantic_configuration);
        let hits = self.search(&self.indexes.report_index, &body).await?;

        Ok(hits.iter().take(top_n).map(passage_from_hit).collect())
    }
}

#[async_trait]
impl RegulationIndex for AzureSearchClient {
    async fn search_regulation_chunks(
        &self,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<RegulationChunk>, SearchError> {
        let body = json!({
            "search": "*",
            "top": top_k,
            "vectorQueries": [
                {
                    "kind": "vector",
                    "vector": embedding,
                    "fields": VECTOR_FIELD,
                    "k": top_k,
                }
            ]
        });
        let hits = self.search(&self.indexes.regulation_index, &body).await?;

        Ok(hits.iter().take(top_k).map(regulation_chunk_from_hit).collect())
    }
}

#[async_trait]
impl IndexerControl for AzureSearchClient {
    async fn run_indexer(&self, indexer: &str) -> Result<(), IngestError> {
        let response = self
            .client
            .post(self.indexer_url(indexer, "run"))
            .header("api-key", &self.api_key)
            .header("Content-Length", "0")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IngestError::BackendResponse {
                backend: "azure-search".to_string(),
                details: format!("indexer run returned {}", response.status()),
            });
        }
        Ok(())
    }

    async fn indexer_status(&self, indexer: &str) -> Result<IndexerStatus, IngestError> {
        let response = self
            .client
            .get(self.indexer_url(indexer, "status"))
            .header("api-key", &self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IngestError::BackendResponse {
                backend: "azure-search".to_string(),
                details: format!("indexer status returned {}", response.status()),
            });
        }

        Ok(response.json::<IndexerStatus>().await?)
    }
}

fn report_query_body(parent_key: &str, top_n: usize, semantic_configuration: &str) -> Value {
    json!({
        "search": "*",
        "top": top_n,
        "queryType": "semantic",
        "semanticConfiguration": semantic_configuration,
        "filter": format!("parent_id eq '{}'", parent_key.replace('\'', "''")),
        "vectorQueries": [
            {
                "kind": "text",
                "text": ESG_TOPIC_QUERY,
                "fields": VECTOR_FIELD,
                "k": top_n,
            }
        ]
    })
}

fn string_field(hit: &Value, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| hit.get(*key).and_then(Value::as_str))
        .unwrap_or_default()
        .to_string()
}

fn passage_from_hit(hit: &Value) -> Passage {
    Passage {
        chunk_id: string_field(hit, &["chunk_id"]),
        content: string_field(hit, &["chunk"]),
        section: string_field(hit, &["section"]),
    }
}

fn regulation_chunk_from_hit(hit: &Value) -> RegulationChunk {
    RegulationChunk {
        reg_chunk_id: string_field(hit, &["chunk_id", "id"]),
        content: string_field(hit, &["chunk", "content"]),
        title: string_field(hit, &["title"]),
        section: string_field(hit, &["section"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IndexerState;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(uri: &str) -> AzureSearchClient {
        AzureSearchClient::new(
            format!("{uri}/"),
            "secret",
            DEFAULT_SEARCH_API_VERSION,
            SearchIndexes {
                report_index: "reports-idx".to_string(),
                regulation_index: "regulation-idx".to_string(),
                semantic_configuration: "reports-semantic-configuration".to_string(),
            },
        )
    }

    #[test]
    fn regulation_hit_falls_back_to_id_and_content() {
        let chunk = regulation_chunk_from_hit(&json!({
            "id": "reg-7",
            "content": "Article 8 disclosure",
            "title": "EBA Guidelines"
        }));
        assert_eq!(chunk.reg_chunk_id, "reg-7");
        assert_eq!(chunk.content, "Article 8 disclosure");
        assert_eq!(chunk.title, "EBA Guidelines");
        assert_eq!(chunk.section, "");
    }

    #[test]
    fn filter_quotes_are_escaped() {
        let body = report_query_body("it's", 3, "cfg");
        assert_eq!(body["filter"], "parent_id eq 'it''s'");
        assert_eq!(body["vectorQueries"][0]["k"], 3);
    }

    #[tokio::test]
    async fn report_passages_are_filtered_by_parent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/indexes/reports-idx/docs/search"))
            .and(query_param("api-version", DEFAULT_SEARCH_API_VERSION))
            .and(header("api-key", "secret"))
            .and(body_partial_json(json!({
                "queryType": "semantic",
                "filter": "parent_id eq 'abc0'"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    {"chunk_id": "c1", "chunk": "Scope 1 emissions fell", "section": "E1"},
                    {"chunk_id": "c2", "chunk": "Board diversity"},
                    {"chunk_id": "c3", "chunk": "extra"}
                ]
            })))
            .mount(&server)
            .await;

        let passages = client(&server.uri())
            .search_report_passages("abc0", 2)
            .await
            .unwrap();

        assert_eq!(
            passages,
            vec![
                Passage {
                    chunk_id: "c1".to_string(),
                    content: "Scope 1 emissions fell".to_string(),
                    section: "E1".to_string(),
                },
                Passage {
                    chunk_id: "c2".to_string(),
                    content: "Board diversity".to_string(),
                    section: String::new(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn empty_regulation_result_is_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/indexes/regulation-idx/docs/search"))
            .and(body_partial_json(json!({"top": 4})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
            .mount(&server)
            .await;

        let chunks = client(&server.uri())
            .search_regulation_chunks(&[0.1, 0.2], 4)
            .await
            .unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn search_failure_reports_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad filter"))
            .mount(&server)
            .await;

        let error = client(&server.uri())
            .search_report_passages("x", 1)
            .await
            .unwrap_err();
        match error {
            SearchError::BackendResponse { details, .. } => assert!(details.contains("bad filter")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn indexer_run_and_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/indexers/reports-indexer/run"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/indexers/reports-indexer/status"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "running",
                "lastResult": {"status": "inProgress", "errors": []}
            })))
            .mount(&server)
            .await;

        let search = client(&server.uri());
        search.run_indexer("reports-indexer").await.unwrap();
        let status = search.indexer_status("reports-indexer").await.unwrap();
        assert_eq!(status.state(), IndexerState::Running);
    }
}
