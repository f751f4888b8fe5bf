//! tablehive 命令行入口
//!
//! 子命令：solve（同步轮次）、batch（批处理任务，可反复调用直到完成）、analyze（事后分析）、
//! memorize（写入记忆）、attach（为问题挂载记忆）、evaluate（准确率）。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};

use tablehive::agents::{MessageRecord, PromptBook, RoleName, RoundLimits, RunContext, SendTo};
use tablehive::config::{load_config, AppConfig};
use tablehive::core::{run_batch_job, run_rounds, BatchRunOutcome, Coordinator};
use tablehive::evaluate::evaluate_and_save;
use tablehive::llm::{create_client, ConcurrentGateway, LlmClient, OpenAiBatchClient};
use tablehive::memory::{
    attach_memories, ingest_records, restore_store, CheckpointFile, IngestOptions, MemoryStore,
};
use tablehive::records::{load_or_init, load_questions, read_jsonl, write_jsonl};
use tablehive::observability;

#[derive(Parser)]
#[command(name = "tablehive")]
#[command(version)]
#[command(about = "Multi-agent table question answering with evolving memory", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// 配置文件（叠加在 config/default.toml 之上）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 覆盖 [app].input_file
    #[arg(long)]
    input: Option<PathBuf>,

    /// 覆盖 [app].output_file
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the agent rounds synchronously until every record ends
    Solve(CommonArgs),
    /// Advance the batch-job rounds; exits early while a job is still running
    Batch(CommonArgs),
    /// Annotate finished records with the Result_Analyze role
    Analyze(CommonArgs),
    /// Write analysed records into the memory checkpoint
    Memorize(CommonArgs),
    /// Attach the most related memory to each question
    Attach(CommonArgs),
    /// Report answer accuracy
    Evaluate(CommonArgs),
}

impl CommonArgs {
    fn load(&self) -> anyhow::Result<AppConfig> {
        let mut cfg = load_config(self.config.as_deref()).context("Failed to load config")?;
        if let Some(input) = &self.input {
            cfg.app.input_file = input.clone();
        }
        if let Some(output) = &self.output {
            cfg.app.output_file = output.clone();
        }
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Solve(args) => solve(&args.load()?).await,
        Commands::Batch(args) => batch(&args.load()?).await,
        Commands::Analyze(args) => analyze(&args.load()?).await,
        Commands::Memorize(args) => memorize(&args.load()?).await,
        Commands::Attach(args) => attach(&args.load()?),
        Commands::Evaluate(args) => evaluate(&args.load()?),
    }
}

fn start_role(cfg: &AppConfig) -> anyhow::Result<RoleName> {
    Ok(cfg.app.start_role.parse()?)
}

fn log_usage(client: &dyn LlmClient) {
    let (prompt, completion, total) = client.token_usage();
    tracing::info!(
        "Token usage: prompt {}, completion {}, total {}",
        prompt,
        completion,
        total
    );
}

async fn solve(cfg: &AppConfig) -> anyhow::Result<()> {
    let ctx = RunContext::from_config(cfg)?;
    let mut records = load_or_init(
        &cfg.app.output_file,
        &cfg.app.input_file,
        cfg.app.head,
        start_role(cfg)?,
    )?;
    let client = create_client(&cfg.llm);
    let gateway = ConcurrentGateway::new(client.clone(), cfg.llm.max_concurrency);

    let rounds =
        run_rounds(&Coordinator::new(ctx), &mut records, &gateway, &cfg.app.output_file).await?;
    tracing::info!("All {} records finished after {} rounds", records.len(), rounds);
    log_usage(client.as_ref());
    Ok(())
}

async fn batch(cfg: &AppConfig) -> anyhow::Result<()> {
    let ctx = RunContext::from_config(cfg)?;
    let mut records = load_or_init(
        &cfg.app.output_file,
        &cfg.app.input_file,
        cfg.app.head,
        start_role(cfg)?,
    )?;
    let gateway = OpenAiBatchClient::new(
        cfg.llm.base_url.as_deref(),
        &cfg.llm.model,
        cfg.llm.api_key.as_deref(),
        &cfg.llm.batch_job_dir,
    );

    let outcome = run_batch_job(
        &Coordinator::new(ctx),
        &mut records,
        &gateway,
        &cfg.app.output_file,
        &cfg.app.round_state_file,
    )
    .await?;
    match outcome {
        BatchRunOutcome::Finished { rounds } => {
            tracing::info!("All records finished ({} rounds in this run)", rounds)
        }
        BatchRunOutcome::Pending { round } => {
            tracing::info!("Job for round {} still running, run again later", round)
        }
    }
    Ok(())
}

async fn analyze(cfg: &AppConfig) -> anyhow::Result<()> {
    let prompts = PromptBook::load(cfg.app.prompts_file.as_deref())?;
    let ctx = RunContext::new(
        cfg.app.dataset.parse()?,
        RoundLimits::from(&cfg.rounds),
        vec![RoleName::ResultAnalyze],
        RoleName::ResultAnalyze,
        cfg.app.baseline_variant.clone(),
        prompts,
    )?;
    let mut records: Vec<MessageRecord> = read_jsonl(&cfg.app.input_file)?;
    records.truncate(cfg.app.head);
    for r in &mut records {
        r.send_to = SendTo::Role(RoleName::ResultAnalyze);
    }
    let client = create_client(&cfg.llm);
    let gateway = ConcurrentGateway::new(client.clone(), cfg.llm.max_concurrency);

    run_rounds(&Coordinator::new(ctx), &mut records, &gateway, &cfg.app.output_file).await?;
    tracing::info!("Analysed {} records into {}", records.len(), cfg.app.output_file.display());
    log_usage(client.as_ref());
    Ok(())
}

fn memory_store(cfg: &AppConfig, client: Arc<dyn LlmClient>) -> anyhow::Result<MemoryStore> {
    let prompts = PromptBook::load(cfg.app.prompts_file.as_deref())?;
    Ok(MemoryStore::from_config(cfg, &prompts, client)?)
}

async fn memorize(cfg: &AppConfig) -> anyhow::Result<()> {
    let client = create_client(&cfg.llm);
    let mut store = memory_store(cfg, client.clone())?;
    let mut records: Vec<MessageRecord> = read_jsonl(&cfg.app.input_file)?;
    records.truncate(cfg.app.head);

    let checkpoint = CheckpointFile::new(&cfg.memory.checkpoint_file);
    let report = ingest_records(
        &mut store,
        &records,
        &checkpoint,
        &IngestOptions::from(&cfg.memory),
    )
    .await?;
    tracing::info!(
        "Processed {} records from index {}: {} inserted, {} skipped",
        report.processed,
        report.resumed_from,
        report.inserted,
        report.skipped
    );
    log_usage(client.as_ref());
    Ok(())
}

fn attach(cfg: &AppConfig) -> anyhow::Result<()> {
    let mut store = memory_store(cfg, create_client(&cfg.llm))?;
    let checkpoint = CheckpointFile::new(&cfg.memory.checkpoint_file);
    if !checkpoint.path().exists() {
        anyhow::bail!("Memory checkpoint {} not found", checkpoint.path().display());
    }
    restore_store(&mut store, &checkpoint)?;
    let stats = store.stats();
    tracing::info!(
        "Loaded {} memories ({} evolutions involving {} memories)",
        store.len(),
        stats.evol_count,
        stats.evol_mem_count
    );

    let mut records = load_questions(&cfg.app.input_file, cfg.app.head, start_role(cfg)?)?;
    attach_memories(
        &mut store,
        &mut records,
        cfg.memory.retrieve_number,
        cfg.memory.retrieve_distance,
    )?;
    write_jsonl(&cfg.app.output_file, &records)?;
    tracing::info!("Memory-enriched questions saved to {}", cfg.app.output_file.display());
    Ok(())
}

fn evaluate(cfg: &AppConfig) -> anyhow::Result<()> {
    let records: Vec<MessageRecord> = read_jsonl(&cfg.app.input_file)?;
    let report = evaluate_and_save(&records, cfg.app.evaluation_file.as_deref())?;
    println!(
        "Total: {}, Correct: {}, Accuracy: {:.2}%",
        report.total,
        report.correct,
        report.accuracy * 100.0
    );
    Ok(())
}
