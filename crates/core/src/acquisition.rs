use crate::error::AcquireError;
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use url::Url;

pub const FIVA_COLLECTION_PAGE: &str =
    "https://www.finanssivalvonta.fi/saantely/maarays-ja-ohjekokoelma/";

/// Path fragment that marks a link as part of the regulation collection.
pub const COLLECTION_PATH_FILTER: &str = "/maarayskokoelma/";

pub const EBA_DOCUMENTS: [RegulationSource; 3] = [
    RegulationSource {
        file_name: "ESG_Guidelines_2025.pdf",
        url: "https://www.eba.europa.eu/sites/default/files/2025-01/fb22982a-d69d-42cc-9d62-1023497ad58a/Final%20Guidelines%20on%20the%20management%20of%20ESG%20risks.pdf",
    },
    RegulationSource {
        file_name: "Fit55_Templates.xlsx",
        url: "https://www.eba.europa.eu/sites/default/files/2023-11/cdc9ffd1-76f9-4711-ae2b-7d4247c85749/FF55%20-%20Templates.xlsx",
    },
    RegulationSource {
        file_name: "Fit55_Template_Guidance.pdf",
        url: "https://www.eba.europa.eu/sites/default/files/2023-11/39f91f76-23b5-4a69-a50d-b3154022e62e/FF55%20-%20Template%20guidance_0.pdf",
    },
];

const USER_AGENT: &str = concat!("esg-audit/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegulationSource {
    pub file_name: &'static str,
    pub url: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    Cached,
    Saved { bytes: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcquisitionSummary {
    pub saved: Vec<PathBuf>,
    pub cached: Vec<PathBuf>,
}

/// Receives per-file transfer progress. `()` ignores everything.
pub trait TransferProgress {
    fn started(&self, _name: &str, _total_bytes: Option<u64>) {}
    fn advanced(&self, _bytes: u64) {}
    fn finished(&self, _name: &str, _outcome: DownloadOutcome) {}
}

impl TransferProgress for () {}

/// Downloads regulation PDFs. Files already on disk are never fetched again.
pub struct DocumentFetcher {
    client: Client,
    page_timeout: Duration,
    download_timeout: Duration,
}

impl DocumentFetcher {
    pub fn new() -> Result<Self, AcquireError> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            page_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(60),
        })
    }

    /// Returns the collection PDF links on `page_url`, deduplicated and sorted.
    pub async fn scrape_links(&self, page_url: &Url) -> Result<Vec<Url>, AcquireError> {
        let response = self
            .client
            .get(page_url.clone())
            .timeout(self.page_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AcquireError::Status {
                url: page_url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        let links = extract_collection_links(&body, page_url);
        debug!(page = %page_url, count = links.len(), "scraped collection links");
        Ok(links)
    }

    /// Downloads `url` to `destination` unless the file already exists.
    pub async fn download(
        &self,
        url: &Url,
        destination: &Path,
        progress: &dyn TransferProgress,
    ) -> Result<DownloadOutcome, AcquireError> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }

        let name = display_name(destination);
        if fs::try_exists(destination).await? {
            progress.finished(&name, DownloadOutcome::Cached);
            return Ok(DownloadOutcome::Cached);
        }

        let mut response = self
            .client
            .get(url.clone())
            .timeout(self.download_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AcquireError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        progress.started(&name, response.content_length());

        // Bytes land in a sibling `.part` file so an interrupted transfer never
        // leaves something that looks cached.
        let partial = partial_path(destination);
        let mut file = fs::File::create(&partial).await?;
        let mut written = 0u64;
        let streamed = async {
            while let Some(chunk) = response.chunk().await? {
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
                progress.advanced(chunk.len() as u64);
            }
            file.flush().await?;
            Ok::<(), AcquireError>(())
        }
        .await;
        drop(file);

        if let Err(error) = streamed {
            let _ = fs::remove_file(&partial).await;
            return Err(error);
        }
        fs::rename(&partial, destination).await?;

        let outcome = DownloadOutcome::Saved { bytes: written };
        progress.finished(&name, outcome);
        Ok(outcome)
    }

    /// Fetches every FIVA collection PDF into `<out>/fiva_mok` and the EBA
    /// documents into `<out>/eba`.
    pub async fn fetch_all(
        &self,
        out_dir: &Path,
        progress: &dyn TransferProgress,
    ) -> Result<AcquisitionSummary, AcquireError> {
        let mut summary = AcquisitionSummary::default();

        let collection_dir = out_dir.join("fiva_mok");
        info!("downloading FIVA regulation collection");
        let page = Url::parse(FIVA_COLLECTION_PAGE)?;
        for url in self.scrape_links(&page).await? {
            let file_name = url_file_name(&url)?;
            let target = collection_dir.join(file_name);
            let outcome = self.download(&url, &target, progress).await?;
            summary.record(target, outcome);
        }

        let eba_dir = out_dir.join("eba");
        info!("downloading EBA ESG and Fit-for-55 documents");
        for source in EBA_DOCUMENTS {
            let url = Url::parse(source.url)?;
            let target = eba_dir.join(source.file_name);
            let outcome = self.download(&url, &target, progress).await?;
            summary.record(target, outcome);
        }

        Ok(summary)
    }
}

impl AcquisitionSummary {
    fn record(&mut self, path: PathBuf, outcome: DownloadOutcome) {
        match outcome {
            DownloadOutcome::Cached => self.cached.push(path),
            DownloadOutcome::Saved { .. } => self.saved.push(path),
        }
    }
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    destination.with_file_name(name)
}

/// Resolves every `a[href]` on the page and keeps collection PDF links.
pub fn extract_collection_links(html: &str, base_url: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    let Ok(anchors) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut links = BTreeSet::new();
    for anchor in document.select(&anchors) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        if !href.to_lowercase().ends_with(".pdf") || !href.contains(COLLECTION_PATH_FILTER) {
            continue;
        }
        if let Ok(resolved) = base_url.join(href) {
            links.insert(resolved);
        }
    }

    links.into_iter().collect()
}

/// Last path segment of `url`, percent-encoding left intact.
pub fn url_file_name(url: &Url) -> Result<String, AcquireError> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AcquireError::MissingFileName(url.to_string()))
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
