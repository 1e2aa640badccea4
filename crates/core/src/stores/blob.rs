use crate::models::BlobTags;
use crate::traits::ReportStore;
use crate::IngestError;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

const STORAGE_API_VERSION: &str = "2021-08-06";

/// Blob endpoint and SAS token parsed from a storage connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConnection {
    pub blob_endpoint: Url,
    pub sas_token: String,
}

impl StorageConnection {
    pub fn parse(connection_string: &str) -> Result<Self, IngestError> {
        let mut protocol = "https".to_string();
        let mut account = None;
        let mut suffix = "core.windows.net".to_string();
        let mut blob_endpoint = None;
        let mut sas_token = None;
        let mut has_account_key = false;

        for pair in connection_string.split(';').filter(|pair| !pair.trim().is_empty()) {
            let Some((key, value)) = pair.split_once('=') else {
                return Err(IngestError::InvalidConnectionString(format!(
                    "segment without '=': {pair}"
                )));
            };
            let value = value.trim().to_string();
            match key.trim() {
                "DefaultEndpointsProtocol" => protocol = value,
                "AccountName" => account = Some(value),
                "EndpointSuffix" => suffix = value,
                "BlobEndpoint" => blob_endpoint = Some(value),
                "SharedAccessSignature" => sas_token = Some(value),
                "AccountKey" => has_account_key = true,
                _ => {}
            }
        }

        let sas_token = match sas_token {
            Some(token) if !token.is_empty() => token.trim_start_matches('?').to_string(),
            _ if has_account_key => {
                return Err(IngestError::InvalidConnectionString(
                    "account-key connection strings are not supported, use a SharedAccessSignature"
                        .to_string(),
                ))
            }
            _ => {
                return Err(IngestError::InvalidConnectionString(
                    "missing SharedAccessSignature".to_string(),
                ))
            }
        };

        let endpoint = match (blob_endpoint, account) {
            (Some(endpoint), _) => endpoint,
            (None, Some(account)) => format!("{protocol}://{account}.blob.{suffix}"),
            (None, None) => {
                return Err(IngestError::InvalidConnectionString(
                    "needs BlobEndpoint or AccountName".to_string(),
                ))
            }
        };

        let mut blob_endpoint = Url::parse(&endpoint)?;
        if !blob_endpoint.path().ends_with('/') {
            let path = format!("{}/", blob_endpoint.path());
            blob_endpoint.set_path(&path);
        }

        Ok(Self {
            blob_endpoint,
            sas_token,
        })
    }
}

pub struct AzureBlobStore {
    client: Client,
    connection: StorageConnection,
    container: String,
}

impl AzureBlobStore {
    pub fn new(connection: StorageConnection, container: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            connection,
            container: container.into(),
        }
    }

    pub fn from_connection_string(
        connection_string: &str,
        container: impl Into<String>,
    ) -> Result<Self, IngestError> {
        Ok(Self::new(
            StorageConnection::parse(connection_string)?,
            container,
        ))
    }

    /// Container and blob name are each appended as one percent-encoded
    /// path segment, so `#`, `?` or `:` in a file name stay part of the name.
    fn blob_url(&self, blob_name: &str, extra_query: Option<&str>) -> Result<Url, IngestError> {
        let mut url = self.connection.blob_endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| {
                IngestError::InvalidConnectionString(format!(
                    "blob endpoint cannot hold a path: {}",
                    self.connection.blob_endpoint
                ))
            })?
            .pop_if_empty()
            .push(&self.container)
            .push(blob_name);

        let query = match extra_query {
            Some(extra) => format!("{extra}&{}", self.connection.sas_token),
            None => self.connection.sas_token.clone(),
        };
        url.set_query(Some(&query));
        Ok(url)
    }
}

#[async_trait]
impl ReportStore for AzureBlobStore {
    async fn put_blob(
        &self,
        blob_name: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), IngestError> {
        let response = self
            .client
            .put(self.blob_url(blob_name, None)?)
            .header("x-ms-version", STORAGE_API_VERSION)
            .header("x-ms-blob-type", "BlockBlob")
            .header("Content-Type", content_type)
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IngestError::BackendResponse {
                backend: "blob-storage".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }

    async fn set_tags(&self, blob_name: &str, tags: &BlobTags) -> Result<(), IngestError> {
        let response = self
            .client
            .put(self.blob_url(blob_name, Some("comp=tags"))?)
            .header("x-ms-version", STORAGE_API_VERSION)
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(tags_xml(tags))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(IngestError::BackendResponse {
                backend: "blob-storage".to_string(),
                details: response.status().to_string(),
            });
        }

        Ok(())
    }
}

fn tags_xml(tags: &BlobTags) -> String {
    let body: String = tags
        .pairs()
        .iter()
        .map(|(key, value)| {
            format!(
                "<Tag><Key>{}</Key><Value>{}</Value></Tag>",
                escape_xml(key),
                escape_xml(value)
            )
        })
        .collect();
    format!(r#"<?xml version="1.0" encoding="utf-8"?><Tags><TagSet>{body}</TagSet></Tags>"#)
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
