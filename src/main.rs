use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hrag_cli::{
    answer_json, check_index, display_banner, render_check, run_interactive, run_json_lines,
    serve,
};
use hrag_core::{
    FusionMode, QueryRequest, RAGEngine, RetrievalConfig, RetryPolicy, SparseEncoder, VectorIndex,
};
use hrag_gemini::GeminiClient;
use hrag_rag::{
    AnswerGenerator, DenseEmbeddingClient, EvalDataset, HybridRagEngine, QdrantConfig,
    QdrantIndex, RecallReport, RetrievalGateway, SparseStrategy, recall_at_k,
};

#[derive(Parser)]
#[command(name = "hrag")]
#[command(about = "Hybrid-retrieval question answering over hospital documents", long_about = None)]
#[command(version)]
struct Cli {
    /// Answer a single question and print the JSON response
    #[arg(short, long, conflicts_with = "json")]
    query: Option<String>,

    /// Read one {"query": ...} object per line from stdin, answer each on stdout.
    /// With `eval`, print the reports as JSON lines
    #[arg(long)]
    json: bool,

    /// Chunks kept for the answer context
    #[arg(long, default_value_t = 6)]
    top_k: usize,

    /// Candidates requested from the dense channel
    #[arg(long, default_value_t = 20)]
    dense_limit: usize,

    /// Candidates requested from the sparse channel (0 disables it)
    #[arg(long, default_value_t = 50)]
    sparse_limit: usize,

    /// Reciprocal-rank fusion constant
    #[arg(long, default_value_t = 60)]
    rrf_k: u32,

    /// Where dense and sparse rankings are fused
    #[arg(long, value_enum, default_value_t = Fusion::Client)]
    fusion: Fusion,

    /// Sparse encoder: splade (local SPLADE++ model) or bm25 (scored by Qdrant)
    #[arg(long, default_value = "splade")]
    sparse: SparseStrategy,

    /// Directory the SPLADE model is downloaded to and loaded from
    #[arg(long)]
    model_cache: Option<PathBuf>,

    /// Timeout for each index call, in seconds
    #[arg(long, default_value_t = 10)]
    search_timeout: u64,

    /// Maximum embedding attempts per query
    #[arg(long, default_value_t = 5)]
    retries: u32,

    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Fusion {
    /// Two searches fused locally
    Client,
    /// One prefetch query fused by Qdrant
    Server,
}

impl Fusion {
    fn label(self) -> &'static str {
        match self {
            Fusion::Client => "client",
            Fusion::Server => "server",
        }
    }
}

impl From<Fusion> for FusionMode {
    fn from(value: Fusion) -> Self {
        match value {
            Fusion::Client => FusionMode::Client,
            Fusion::Server => FusionMode::Server,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Verify Qdrant connectivity and the collection's named vectors
    Check,
    /// Print collection and engine statistics as JSON
    Stats,
    /// Serve POST /query over HTTP
    Serve {
        /// Address to bind
        #[arg(long, default_value = "127.0.0.1:8000")]
        addr: SocketAddr,
    },
    /// Compare dense-only and hybrid Recall@k on a BEIR-style query set
    Eval {
        /// queries.jsonl with one {"_id", "text"} object per line
        #[arg(long)]
        queries: PathBuf,
        /// Relevance judgements (`qid 0 doc_id rel` per line)
        #[arg(long)]
        qrels: PathBuf,
        /// Cutoff for Recall@k
        #[arg(short, long, default_value_t = 5)]
        k: usize,
    },
}

impl Cli {
    fn retrieval_config(&self) -> RetrievalConfig {
        RetrievalConfig {
            dense_limit: self.dense_limit,
            sparse_limit: self.sparse_limit,
            top_k: self.top_k,
            rrf_k: self.rrf_k,
            fusion_mode: self.fusion.into(),
            search_timeout: Duration::from_secs(self.search_timeout),
        }
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retries,
            ..RetryPolicy::default()
        }
    }
}

struct Components {
    gemini: Arc<GeminiClient>,
    encoder: Arc<dyn SparseEncoder>,
    index: Arc<QdrantIndex>,
    retry: RetryPolicy,
}

impl Components {
    fn engine(&self, config: RetrievalConfig) -> Result<HybridRagEngine> {
        let embedder = DenseEmbeddingClient::new(self.gemini.clone()).with_retry(self.retry.clone());
        let gateway = RetrievalGateway::new(
            embedder,
            self.encoder.clone(),
            self.index.clone(),
            config.search_timeout,
        );
        let generator = AnswerGenerator::new(self.gemini.clone());
        Ok(HybridRagEngine::new(gateway, generator, config)?)
    }
}

fn render_recall(reports: &[RecallReport]) {
    println!("{}", "Retrieval evaluation".bold());
    for report in reports {
        println!(
            "  {} Recall@{}: {} ({}/{} queries{})",
            format!("{:<16}", report.mode).cyan(),
            report.k,
            format!("{:.3}", report.recall).bold(),
            report.hits,
            report.evaluated,
            if report.failed > 0 {
                format!(", {} failed", report.failed)
            } else {
                String::new()
            }
        );
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let retrieval = cli.retrieval_config();
    retrieval.validate()?;
    let retry = cli.retry_policy();
    retry.validate()?;

    let mut qdrant_config = QdrantConfig::from_env()?;
    qdrant_config.timeout = retrieval.search_timeout;
    let index = Arc::new(QdrantIndex::new(qdrant_config)?);

    if let Some(Commands::Check) = cli.command {
        let report = check_index(index.as_ref()).await;
        render_check(&report);
        if !report.is_healthy() {
            bail!("index check failed");
        }
        return Ok(());
    }

    let gemini = Arc::new(GeminiClient::from_env().context("Gemini is not configured")?);
    let encoder = cli
        .sparse
        .build(cli.model_cache.clone())
        .context("sparse encoder could not be loaded")?;
    info!(
        embedding_model = %gemini.config().embedding_model,
        generation_model = %gemini.config().generation_model,
        sparse = encoder.name(),
        "starting hybrid engine"
    );

    let components = Components {
        gemini,
        encoder,
        index: index.clone(),
        retry,
    };

    if let Some(Commands::Eval { queries, qrels, k }) = &cli.command {
        let dataset = EvalDataset::load(queries, qrels)
            .with_context(|| format!("failed to read {} / {}", queries.display(), qrels.display()))?;
        info!(queries = dataset.queries.len(), judged = dataset.qrels.len(), "evaluation set loaded");

        let hybrid_config = RetrievalConfig {
            top_k: *k,
            ..retrieval.clone()
        };
        let dense_config = RetrievalConfig {
            sparse_limit: 0,
            fusion_mode: FusionMode::Client,
            ..hybrid_config.clone()
        };
        let hybrid_label = format!("hybrid ({})", cli.fusion.label());

        let dense = recall_at_k(&components.engine(dense_config)?, "dense", &dataset, *k).await;
        let hybrid = recall_at_k(&components.engine(hybrid_config)?, &hybrid_label, &dataset, *k).await;
        let reports = [dense, hybrid];

        if cli.json {
            for report in &reports {
                println!("{}", serde_json::to_string(report)?);
            }
        } else {
            render_recall(&reports);
        }
        return Ok(());
    }

    let engine = components.engine(retrieval)?;

    if let Some(Commands::Serve { addr }) = cli.command {
        serve(Arc::new(engine), addr).await?;
        return Ok(());
    }

    if let Some(Commands::Stats) = cli.command {
        let stats = engine.stats().await?;
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    if let Some(question) = &cli.query {
        let body = answer_json(&engine, &QueryRequest::new(question.as_str())).await;
        println!("{}", serde_json::to_string(&body)?);
        if body.get("error").is_some() {
            std::process::exit(1);
        }
        return Ok(());
    }

    if cli.json {
        let answered = run_json_lines(&engine, io::stdin().lock(), io::stdout().lock()).await?;
        info!(answered, "stdin closed");
        return Ok(());
    }

    display_banner();
    match index.collection_info().await {
        Ok(info) if info.supports_hybrid() => {
            println!("{} Connected to '{}'", "✅".green(), info.name);
        }
        Ok(info) => {
            println!(
                "{} Collection '{}' lacks a named dense or sparse vector, answers may degrade",
                "⚠️".yellow(),
                info.name
            );
        }
        Err(e) => println!("{} Could not read collection info: {}", "⚠️".yellow(), e),
    }
    println!();

    run_interactive(&engine).await?;
    Ok(())
}
