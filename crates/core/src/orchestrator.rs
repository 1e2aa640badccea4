use crate::compare::{compare, parse_analysis};
use crate::models::{ComparisonDepth, ComparisonResult, ComparisonRun};
use crate::retrieval::{get_regulation_chunks, get_report_passages, ReportLocator};
use crate::traits::{ChatModel, Embedder, PassageIndex, RegulationIndex};
use crate::SearchError;
use tracing::{info, warn};

/// Drives retrieval and comparison for one uploaded report. Every remote call
/// is awaited before the next one starts.
pub struct ComparisonCoordinator<P, R, E, C>
where
    P: PassageIndex,
    R: RegulationIndex,
    E: Embedder,
    C: ChatModel,
{
    passages: P,
    regulations: R,
    embedder: E,
    chat: C,
    locator: ReportLocator,
}

impl<P, R, E, C> ComparisonCoordinator<P, R, E, C>
where
    P: PassageIndex + Send + Sync,
    R: RegulationIndex + Send + Sync,
    E: Embedder + Send + Sync,
    C: ChatModel + Send + Sync,
{
    pub fn new(passages: P, regulations: R, embedder: E, chat: C, locator: ReportLocator) -> Self {
        Self {
            passages,
            regulations,
            embedder,
            chat,
            locator,
        }
    }

    pub async fn run(
        &self,
        origin_id: &str,
        depth: &ComparisonDepth,
    ) -> Result<ComparisonRun, SearchError> {
        let passages = get_report_passages(
            &self.passages,
            &self.locator,
            origin_id,
            depth.report_passages,
        )
        .await?;

        let mut run = ComparisonRun::default();
        if passages.is_empty() {
            warn!(origin_id, "no report passages matched");
            return Ok(run);
        }
        info!(origin_id, passages = passages.len(), "report passages retrieved");

        for passage in &passages {
            let embedding = self.embedder.embed(&passage.content).await?;
            let chunks =
                get_regulation_chunks(&self.regulations, &embedding, depth.regulation_chunks)
                    .await?;

            if chunks.is_empty() {
                warn!(chunk_id = %passage.chunk_id, "no regulation chunks found, skipping passage");
                run.skipped_passages.push(passage.chunk_id.clone());
                continue;
            }

            for chunk in &chunks {
                info!(
                    report_chunk = %passage.chunk_id,
                    regulation_chunk = %chunk.reg_chunk_id,
                    "comparing"
                );
                let output =
                    compare(&self.chat, &passage.content, &chunk.content, &chunk.title).await?;
                let analysis = parse_analysis(&output);
                if !analysis.is_parsed() {
                    warn!(
                        report_chunk = %passage.chunk_id,
                        regulation_chunk = %chunk.reg_chunk_id,
                        "model output was not a JSON object"
                    );
                }
                run.comparisons
                    .push(ComparisonResult::from_pair(passage, chunk, analysis));
            }
        }

        run.passages = passages;
        Ok(run)
    }
}
