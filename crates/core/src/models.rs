use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadedReport {
    pub blob_name: String,
    pub origin_id: String,
    pub size_bytes: u64,
    pub checksum: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlobTags {
    pub source_type: String,
    pub origin_id: String,
}

impl BlobTags {
    pub fn for_report(origin_id: impl Into<String>) -> Self {
        Self {
            source_type: "report".to_string(),
            origin_id: origin_id.into(),
        }
    }

    /// Tag pairs in the key spelling the storage service expects.
    pub fn pairs(&self) -> [(&'static str, &str); 2] {
        [
            ("sourceType", self.source_type.as_str()),
            ("originId", self.origin_id.as_str()),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Passage {
    pub chunk_id: String,
    pub content: String,
    pub section: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegulationChunk {
    pub reg_chunk_id: String,
    pub content: String,
    pub title: String,
    pub section: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct StructuredAnalysis {
    pub ambiguities: Option<Vec<String>>,
    pub inconsistencies: Option<Vec<String>>,
    pub recommendations: Option<Vec<String>>,
}

impl StructuredAnalysis {
    /// The three finding lists in rendering order, keyed by their JSON name.
    pub fn lists(&self) -> [(&'static str, Option<&[String]>); 3] {
        [
            ("ambiguities", self.ambiguities.as_deref()),
            ("inconsistencies", self.inconsistencies.as_deref()),
            ("recommendations", self.recommendations.as_deref()),
        ]
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Analysis {
    Unparsed { raw_output: String },
    Structured(StructuredAnalysis),
}

impl Analysis {
    pub fn is_parsed(&self) -> bool {
        matches!(self, Analysis::Structured(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComparisonResult {
    pub report_chunk_id: String,
    pub reg_chunk_id: String,
    pub reg_title: String,
    pub report_content: String,
    pub section: String,
    pub analysis: Analysis,
}

impl ComparisonResult {
    pub fn from_pair(passage: &Passage, chunk: &RegulationChunk, analysis: Analysis) -> Self {
        Self {
            report_chunk_id: passage.chunk_id.clone(),
            reg_chunk_id: chunk.reg_chunk_id.clone(),
            reg_title: chunk.title.clone(),
            report_content: passage.content.clone(),
            section: chunk.section.clone(),
            analysis,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexerRun {
    pub status: String,
    #[serde(default)]
    pub errors: Vec<IndexerItemError>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IndexerItemError {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub error_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IndexerStatus {
    pub status: String,
    #[serde(default)]
    pub last_result: Option<IndexerRun>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexerState {
    Running,
    Succeeded,
    Failed(Vec<String>),
}

impl IndexerStatus {
    pub fn state(&self) -> IndexerState {
        let last = self
            .last_result
            .as_ref()
            .map(|run| run.status.to_lowercase())
            .unwrap_or_default();

        if matches!(last.as_str(), "running" | "inprogress" | "in_progress") {
            return IndexerState::Running;
        }

        let failed_run = matches!(
            last.as_str(),
            "error" | "transientfailure" | "persistentfailure"
        );
        if self.status.eq_ignore_ascii_case("error") || failed_run {
            let failures = self
                .last_result
                .iter()
                .flat_map(|run| run.errors.iter())
                .map(|error| match &error.key {
                    Some(key) => format!("{key}: {}", error.error_message),
                    None => error.error_message.clone(),
                })
                .collect();
            return IndexerState::Failed(failures);
        }

        if self.last_result.is_none() {
            return IndexerState::Running;
        }

        IndexerState::Succeeded
    }
}

#[derive(Debug, Clone)]
pub struct ComparisonDepth {
    pub report_passages: usize,
    pub regulation_chunks: usize,
}

impl Default for ComparisonDepth {
    fn default() -> Self {
        Self {
            report_passages: 3,
            regulation_chunks: 3,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ComparisonRun {
    pub passages: Vec<Passage>,
    pub skipped_passages: Vec<String>,
    pub comparisons: Vec<ComparisonResult>,
}
