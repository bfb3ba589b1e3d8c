use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;

use tabula::{
    config::Config,
    dataset::{load_csv_path, DatasetProfile},
    pipeline::Pipeline,
    routes::create_router,
    types::LLMProvider,
    utils::init_logger,
    AppState,
};

#[derive(Parser)]
#[command(name = "tabula", version, about = "Ask questions about a tabular dataset")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP API
    Serve,
    /// Answer one question about a CSV file and print the turn as JSON
    Ask {
        #[arg(short, long)]
        file: PathBuf,
        #[arg(short, long)]
        question: String,
        #[command(flatten)]
        llm: ModelArgs,
    },
    /// Chart and trend narrative of one column, printed as JSON
    Explore {
        #[arg(short, long)]
        file: PathBuf,
        #[arg(short, long)]
        variable: String,
        #[command(flatten)]
        llm: ModelArgs,
    },
    /// Print the profile of a CSV file as JSON
    Profile {
        #[arg(short, long)]
        file: PathBuf,
        /// Add model-written column descriptions
        #[arg(long)]
        describe: bool,
        #[command(flatten)]
        llm: ModelArgs,
    },
}

/// Overrides of the configured model for one run
#[derive(Args)]
struct ModelArgs {
    #[arg(long)]
    provider: Option<LLMProvider>,
    #[arg(long)]
    model: Option<String>,
}

impl ModelArgs {
    fn pipeline(&self) -> anyhow::Result<Pipeline> {
        let config = Config::from_env()?;
        let llm = config.llm.with_overrides(self.provider, self.model.as_deref())?;
        Ok(Pipeline::from_config(&llm, config.pipeline))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let log_dir = std::env::var("LOG_DIR").ok().map(PathBuf::from);
    let _guard = init_logger(log_dir.as_deref());

    match Cli::parse().command {
        Command::Serve => serve().await,
        Command::Ask { file, question, llm } => ask(&file, &question, &llm).await,
        Command::Explore { file, variable, llm } => explore(&file, &variable, &llm).await,
        Command::Profile { file, describe, llm } => profile(&file, describe, &llm).await,
    }
}

async fn serve() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    info!("Configuration loaded: {:?}", config.server);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("HOST and PORT must form a socket address")?;

    let state = AppState::new(config);
    let app = create_router(state);

    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

async fn ask(file: &Path, question: &str, llm: &ModelArgs) -> anyhow::Result<()> {
    let question = question.trim();
    if question.is_empty() {
        anyhow::bail!("question must not be empty");
    }

    let pipeline = llm.pipeline()?;
    let table = load_csv_path(file)?;

    let report = pipeline.run_turn(&table, question).await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn explore(file: &Path, variable: &str, llm: &ModelArgs) -> anyhow::Result<()> {
    let pipeline = llm.pipeline()?;
    let table = load_csv_path(file)?;

    let report = pipeline.explore_variable(&table, variable).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn profile(file: &Path, describe: bool, llm: &ModelArgs) -> anyhow::Result<()> {
    let table = load_csv_path(file)?;
    let mut profile = DatasetProfile::build(&table);
    if describe {
        let descriptions = llm.pipeline()?.describe_columns(&table).await?;
        profile = profile.with_column_descriptions(descriptions);
    }
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}
