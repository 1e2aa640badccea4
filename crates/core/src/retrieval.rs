use crate::models::{Passage, RegulationChunk};
use crate::traits::{PassageIndex, RegulationIndex};
use crate::SearchError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

/// Where uploaded reports live, used to rebuild the indexed parent key.
#[derive(Debug, Clone)]
pub struct ReportLocator {
    pub storage_account: String,
    pub container: String,
}

impl ReportLocator {
    pub fn blob_url(&self, origin_id: &str) -> String {
        format!(
            "https://{}.blob.core.windows.net/{}/{}.pdf",
            self.storage_account, self.container, origin_id
        )
    }

    pub fn parent_key(&self, origin_id: &str) -> String {
        url_token_encode(self.blob_url(origin_id).as_bytes())
    }
}

/// URL-token base64: URL-safe alphabet without padding, followed by the
/// number of stripped padding characters. This is how the indexer derives
/// document keys from blob paths.
pub fn url_token_encode(bytes: &[u8]) -> String {
    let padding = (3 - bytes.len() % 3) % 3;
    format!("{}{}", URL_SAFE_NO_PAD.encode(bytes), padding)
}

pub async fn get_report_passages<P>(
    index: &P,
    locator: &ReportLocator,
    origin_id: &str,
    top_n: usize,
) -> Result<Vec<Passage>, SearchError>
where
    P: PassageIndex + ?Sized,
{
    let parent_key = locator.parent_key(origin_id);
    tracing::debug!(origin_id, parent_key = %parent_key, "querying report passages");

    let mut passages = index.search_report_passages(&parent_key, top_n).await?;
    passages.truncate(top_n);
    Ok(passages)
}

pub async fn get_regulation_chunks<R>(
    index: &R,
    embedding: &[f32],
    top_k: usize,
) -> Result<Vec<RegulationChunk>, SearchError>
where
    R: RegulationIndex + ?Sized,
{
    let mut chunks = index.search_regulation_chunks(embedding, top_k).await?;
    chunks.truncate(top_k);
    Ok(chunks)
}
