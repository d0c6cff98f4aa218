// Curricula experiment runner
// Compares curriculum training against direct training on the target task

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use curricula_core::{AgentFamily, Interrupt};
use curricula_experiment::{ArmFilter, Campaign, CampaignLimits, ExperimentConfig};

#[derive(Parser)]
#[command(name = "curricula")]
#[command(about = "Resumable curriculum learning experiments", version)]
struct Cli {
    /// Maximum wall time in seconds; no run starts after it elapses
    #[arg(short, long)]
    time: Option<f64>,

    /// Maximum number of runs in this invocation
    #[arg(short, long)]
    runs: Option<usize>,

    /// Only schedule this agent family (actor_critic or dqn)
    #[arg(short, long)]
    agent: Option<String>,

    /// Skip curriculum runs
    #[arg(long)]
    disable_curriculum: bool,

    /// Skip no-curriculum runs
    #[arg(long)]
    disable_nocurriculum: bool,

    /// Experiment configuration (YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let config = match &cli.config {
        Some(path) => ExperimentConfig::load(path)
            .await
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => ExperimentConfig::default(),
    };

    let mut filter = ArmFilter {
        family: None,
        allow_curriculum: !cli.disable_curriculum,
        allow_nocurriculum: !cli.disable_nocurriculum,
    };
    if let Some(agent) = &cli.agent {
        let family: AgentFamily = agent.parse().context("Invalid --agent")?;
        filter = filter.with_family(family)?;
    }

    let wall_time = cli
        .time
        .map(|secs| Duration::try_from_secs_f64(secs).context("Invalid --time"))
        .transpose()?;

    let interrupt = Interrupt::new();
    interrupt.install_ctrl_c();

    let summary = Campaign::new(config)?
        .with_filter(filter)
        .with_limits(CampaignLimits {
            max_runs: cli.runs,
            wall_time,
        })
        .with_interrupt(interrupt)
        .run()
        .await
        .context("Campaign failed")?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
