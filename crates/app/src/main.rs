use anyhow::Context;
use chrono::Utc;
use clap::builder::NonEmptyStringValueParser;
use clap::{Args, Parser, Subcommand};
use esg_audit_core::stores::DEFAULT_SEARCH_API_VERSION;
use esg_audit_core::{
    format_console, render, trigger_index_and_wait, upload_report, ComparisonCoordinator,
    ComparisonDepth, DocumentFetcher, DownloadOutcome, ServiceConfig, Services, TransferProgress,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "esg-audit", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download the FIVA regulation collection and the EBA guideline PDFs.
    Fetch {
        /// Root folder for downloaded documents.
        #[arg(long, default_value = "./downloads")]
        out: PathBuf,
    },
    /// Upload a report, index it and compare its passages against regulation.
    Compare {
        /// Path to the ESG report PDF.
        #[arg(long, value_parser = NonEmptyStringValueParser::new())]
        report: String,
        /// Number of report passages to compare.
        #[arg(long, default_value = "3")]
        report_depth: usize,
        /// Number of regulation chunks retrieved per passage.
        #[arg(long, default_value = "3")]
        regulation_depth: usize,
        /// Folder for the generated document and log.
        #[arg(long, default_value = "output")]
        output_folder: PathBuf,
        /// Seconds between indexer status checks.
        #[arg(long, default_value = "5")]
        poll_interval_secs: u64,
        /// Print every comparison to stdout before writing the document.
        #[arg(long, default_value_t = false)]
        print_results: bool,
        #[command(flatten)]
        services: ServiceArgs,
    },
}

#[derive(Args)]
struct ServiceArgs {
    /// Blob storage connection string with a shared access signature.
    #[arg(long, env = "AZURE_STORAGE_CONN", hide_env_values = true)]
    storage_connection_string: String,
    /// Storage account that hosts the report container.
    #[arg(long, env = "BLOB_STORAGE_NAME")]
    storage_account: String,
    #[arg(long, env = "REPORT_CONTAINER", default_value = "reports")]
    report_container: String,
    #[arg(long, env = "SEARCH_ENDPOINT")]
    search_endpoint: String,
    #[arg(long, env = "SEARCH_KEY", hide_env_values = true)]
    search_key: String,
    #[arg(long, env = "SEARCH_API_VERSION", default_value = DEFAULT_SEARCH_API_VERSION)]
    search_api_version: String,
    #[arg(long, env = "REPORT_SEARCH_IDX_NAME")]
    report_index: String,
    #[arg(long, env = "REGULATION_SEARCH_IDX_NAME")]
    regulation_index: String,
    #[arg(
        long,
        env = "REPORT_SEMANTIC_CONFIG",
        default_value = "reports-semantic-configuration"
    )]
    report_semantic_configuration: String,
    #[arg(long, env = "REPORT_INDEXER_NAME")]
    report_indexer: String,
    #[arg(long, env = "AZURE_OPENAI_ENDPOINT")]
    openai_endpoint: String,
    #[arg(long, env = "AZURE_OPENAI_KEY", hide_env_values = true)]
    openai_key: String,
    #[arg(long, env = "AZURE_OPENAI_API_VERSION")]
    openai_api_version: String,
    #[arg(long, env = "EMBED_DEPLOY")]
    embedding_deployment: String,
    #[arg(long, env = "CHAT_DEPLOY")]
    chat_deployment: String,
}

impl From<ServiceArgs> for ServiceConfig {
    fn from(args: ServiceArgs) -> Self {
        ServiceConfig {
            storage_connection_string: args.storage_connection_string,
            storage_account: args.storage_account,
            report_container: args.report_container,
            search_endpoint: args.search_endpoint,
            search_key: args.search_key,
            search_api_version: args.search_api_version,
            report_index: args.report_index,
            regulation_index: args.regulation_index,
            report_semantic_configuration: args.report_semantic_configuration,
            report_indexer: args.report_indexer,
            openai_endpoint: args.openai_endpoint,
            openai_key: args.openai_key,
            openai_api_version: args.openai_api_version,
            embedding_deployment: args.embedding_deployment,
            chat_deployment: args.chat_deployment,
        }
    }
}

/// Download progress shown as a byte bar, reset for every file.
struct DownloadBar {
    bar: ProgressBar,
}

impl DownloadBar {
    fn new() -> Self {
        let bar = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::with_template(
            "{msg:40!} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec})",
        ) {
            bar.set_style(style.progress_chars("=> "));
        }
        Self { bar }
    }
}

impl TransferProgress for DownloadBar {
    fn started(&self, name: &str, total_bytes: Option<u64>) {
        self.bar.reset();
        self.bar.set_length(total_bytes.unwrap_or(0));
        self.bar.set_message(name.to_string());
    }

    fn advanced(&self, bytes: u64) {
        self.bar.inc(bytes);
    }

    fn finished(&self, name: &str, outcome: DownloadOutcome) {
        match outcome {
            DownloadOutcome::Cached => self.bar.println(format!("{name} already exists, skipping")),
            DownloadOutcome::Saved { bytes } => {
                self.bar.println(format!("Saved {name} ({bytes} bytes)"))
            }
        }
    }
}

fn waiting_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg} [{elapsed}]") {
        spinner.set_style(style);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "esg-audit boot"
    );

    tokio::select! {
        result = run(cli.command) => result,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted by user");
            std::process::exit(1);
        }
    }
}

async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Fetch { out } => cmd_fetch(&out).await,
        Command::Compare {
            report,
            report_depth,
            regulation_depth,
            output_folder,
            poll_interval_secs,
            print_results,
            services,
        } => {
            let depth = ComparisonDepth {
                report_passages: report_depth,
                regulation_chunks: regulation_depth,
            };
            cmd_compare(
                Path::new(&report),
                depth,
                &output_folder,
                Duration::from_secs(poll_interval_secs),
                print_results,
                services.into(),
            )
            .await
        }
    }
}

async fn cmd_fetch(out: &Path) -> anyhow::Result<()> {
    let fetcher = DocumentFetcher::new()?;
    let progress = DownloadBar::new();
    let summary = fetcher
        .fetch_all(out, &progress)
        .await
        .context("regulation download failed")?;
    progress.bar.finish_and_clear();

    println!(
        "{} documents downloaded, {} already present under {}",
        summary.saved.len(),
        summary.cached.len(),
        out.display()
    );
    Ok(())
}

async fn cmd_compare(
    report: &Path,
    depth: ComparisonDepth,
    output_folder: &Path,
    poll_interval: Duration,
    print_results: bool,
    config: ServiceConfig,
) -> anyhow::Result<()> {
    let services = Services::connect(&config)?;

    let uploaded = upload_report(&services.blob, report)
        .await
        .with_context(|| format!("failed to upload {}", report.display()))?;
    println!(
        "Uploaded {} ({} bytes, sha256 {})",
        uploaded.blob_name, uploaded.size_bytes, uploaded.checksum
    );

    let spinner = waiting_spinner(&format!("Indexing with {}", config.report_indexer));
    let indexed =
        trigger_index_and_wait(&services.indexer, &config.report_indexer, poll_interval).await;
    spinner.finish_and_clear();
    indexed.context("report indexing failed")?;
    println!("Indexer {} finished", config.report_indexer);

    let Services {
        report_search,
        regulation_search,
        embedder,
        chat,
        locator,
        ..
    } = services;
    let coordinator =
        ComparisonCoordinator::new(report_search, regulation_search, embedder, chat, locator);

    let spinner = waiting_spinner("Comparing report passages against regulation");
    let run = coordinator.run(&uploaded.origin_id, &depth).await;
    spinner.finish_and_clear();
    let run = run.context("comparison failed")?;

    if run.passages.is_empty() {
        println!(
            "No indexed passages found for {}. Check that the indexer processed the report.",
            uploaded.blob_name
        );
        std::process::exit(1);
    }
    for chunk_id in &run.skipped_passages {
        println!("No regulation matched passage {chunk_id}, skipped");
    }

    if print_results {
        println!("{}", format_console(&run.comparisons));
    }

    let rendered = render(&run.comparisons, &uploaded.origin_id, output_folder)?;
    println!(
        "{} comparisons, {} sections written to {}",
        run.comparisons.len(),
        rendered.sections_written,
        rendered.document_path.display()
    );
    if rendered.unparsed_logged > 0 {
        println!(
            "{} unparsed responses logged to {}",
            rendered.unparsed_logged,
            rendered.log_path.display()
        );
    }
    Ok(())
}
