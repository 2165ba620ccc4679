use std::{error::Error, path::PathBuf, sync::Arc};

use clap::{Parser, Subcommand};
use mailgate_utils::{
    build_dispatcher, build_validators, load_config, Config, IngressPolicy, LogFormat,
    LoggingConfig, RawEmailRecord, RecordCodec, RecordPublisher, RedisPublisher, RedisSubscriber,
    ValidationPipeline,
};
use tokio::{fs, signal};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "config.toml";

#[derive(Parser)]
#[command(name = "mailgate-validator")]
#[command(about = "Forwards only authenticated email records", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Consume the inbound queue and forward valid records
    Serve,
    /// Publish a local email file onto the inbound queue
    Ingest {
        /// Envelope sender
        #[arg(long)]
        from: String,
        /// Envelope recipients
        #[arg(long, required = true)]
        to: Vec<String>,
        /// RFC 5322 message file
        file: PathBuf,
    },
    /// Run the validators over a local email file without forwarding
    Check {
        /// Envelope sender
        #[arg(long, default_value = "")]
        from: String,
        /// Envelope recipients
        #[arg(long)]
        to: Vec<String>,
        /// RFC 5322 message file
        file: PathBuf,
    },
}

/// Loads the configuration file, falling back to the defaults when no
/// path is given and `config.toml` does not exist.
fn read_config(path: Option<PathBuf>) -> Result<Config, Box<dyn Error>> {
    match path {
        Some(path) => Ok(load_config(&path)?),
        None if PathBuf::from(DEFAULT_CONFIG).exists() => {
            Ok(load_config(&PathBuf::from(DEFAULT_CONFIG))?)
        }
        None => {
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }
}

fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    match config.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

async fn serve(config: Config) -> Result<(), Box<dyn Error>> {
    let dispatcher = Arc::new(build_dispatcher(&config.validators, &config.publisher)?);
    let subscriber = RedisSubscriber::new(
        &config.inbound.url,
        config.inbound.queue.clone(),
        config.inbound.max_in_flight,
        config.inbound.poll_timeout,
    )?;

    let shutdown = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C, shutting down"),
        }
    };

    info!(
        queue = %config.inbound.queue,
        version = env!("CARGO_PKG_VERSION"),
        "Mailgate-Validator running"
    );
    subscriber.run(dispatcher, shutdown).await?;
    info!("Mailgate-Validator stopped");
    Ok(())
}

async fn ingest(
    config: Config,
    from: String,
    to: Vec<String>,
    file: PathBuf,
) -> Result<(), Box<dyn Error>> {
    let content = fs::read(&file).await?;
    let policy = IngressPolicy::from_config(&config.ingress)?;
    let record = policy.build_record(&from, to, content)?;
    let payload = RecordCodec::new()?.encode(&record)?;

    let publisher = RedisPublisher::new(&config.inbound.url, config.inbound.queue.clone())?;
    let message_id = publisher
        .publish(&payload, &config.ingress.ordering_key)
        .await?;
    println!("Published {} as {message_id}", file.display());
    Ok(())
}

async fn check(
    config: Config,
    from: String,
    to: Vec<String>,
    file: PathBuf,
) -> Result<bool, Box<dyn Error>> {
    let content = fs::read(&file).await?;
    let record = RawEmailRecord::new(from, to, content);
    let pipeline = ValidationPipeline::new(build_validators(&config.validators)?);

    let outcome = pipeline.evaluate(&record).await;
    for verdict in outcome.verdicts() {
        println!(
            "{:<12} {}",
            verdict.identity,
            if verdict.valid { "pass" } else { "fail" }
        );
    }
    println!("{}", if outcome.is_valid() { "VALID" } else { "INVALID" });
    Ok(outcome.is_valid())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = read_config(cli.config)?;
    init_logging(&config.logging);

    match cli.command {
        Command::Serve => serve(config).await?,
        Command::Ingest { from, to, file } => ingest(config, from, to, file).await?,
        Command::Check { from, to, file } => {
            if !check(config, from, to, file).await? {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
