use clap::{Parser, Subcommand};
use std::path::PathBuf;
use telemetry_relay::kafka::{KafkaAdminGateway, TopicAdmin};
use telemetry_relay::config::DEFAULT_CONFIG_FILE;
use telemetry_relay::{
    Config, Error, KeyedProducerPool, OutboundRecord, ProducerKind, Result, TopicProvisioner,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "telemetry-relay")]
#[command(
    about = "Relay test-execution telemetry to Kafka through pooled producers",
    long_about = None
)]
struct Args {
    /// Configuration file; must exist when given
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Make sure the topic exists with at least the requested partitions
    Provision {
        #[arg(long)]
        topic: Option<String>,
        #[arg(long)]
        partitions: Option<usize>,
    },
    /// Publish each line read from stdin as one record
    Publish {
        #[arg(long)]
        topic: Option<String>,
        #[arg(long, default_value = "json")]
        kind: String,
        #[arg(long)]
        key: Option<String>,
    },
    /// List topic names known to the broker
    Topics,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    let loaded = match &args.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Config::from_file(path)
        }
        None => {
            info!("Loading configuration from {} if present", DEFAULT_CONFIG_FILE);
            Config::from_default_location()
        }
    };
    let mut config = match loaded {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    info!(
        kafka_brokers = ?config.kafka.brokers,
        topic = %config.topic.name,
        max_total_per_key = ?config.pool.max_total_per_key,
        max_wait_ms = ?config.pool.max_wait_ms,
        "Configuration summary"
    );

    match args.command {
        Command::Provision { topic, partitions } => {
            override_topic(&mut config, topic, partitions);
            provision(&config).await
        }
        Command::Publish { topic, kind, key } => {
            override_topic(&mut config, topic, None);
            let kind: ProducerKind = kind.parse()?;
            provision(&config).await?;
            publish_stdin(&config, kind, key).await
        }
        Command::Topics => {
            let gateway = KafkaAdminGateway::new(&config)?;
            let names = gateway.list_topic_names().await;
            gateway.teardown().await;
            for name in names? {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

fn override_topic(config: &mut Config, topic: Option<String>, partitions: Option<usize>) {
    if let Some(topic) = topic {
        config.topic.name = topic;
    }
    if let Some(partitions) = partitions {
        config.topic.partitions = partitions;
    }
}

async fn provision(config: &Config) -> Result<()> {
    let outcome = TopicProvisioner::connect(config)?
        .create_or_update(&config.topic.name, config.topic.partitions)
        .await?;
    info!(topic = %config.topic.name, ?outcome, "Topic ready");
    Ok(())
}

async fn publish_stdin(config: &Config, kind: ProducerKind, key: Option<String>) -> Result<()> {
    let pool = KeyedProducerPool::from_config(config)?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let (mut published, mut failed) = (0u64, 0u64);

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let record = match encode(&config.topic.name, key.clone(), kind, line) {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping line that is not valid for {} records: {}", kind, e);
                failed += 1;
                continue;
            }
        };

        match pool.publish(&record, kind).await {
            Ok(()) => published += 1,
            Err(Error::Shutdown) => break,
            Err(_) => failed += 1,
        }
    }

    pool.shutdown().await;
    info!(published, failed, "Finished publishing");
    Ok(())
}

fn encode(
    topic: &str,
    key: Option<String>,
    kind: ProducerKind,
    line: String,
) -> Result<OutboundRecord> {
    match kind {
        ProducerKind::Json => {
            let event: serde_json::Value = serde_json::from_str(&line)?;
            OutboundRecord::json(topic, key, &event)
        }
        ProducerKind::Binary => Ok(OutboundRecord::binary(topic, key, line.into_bytes())),
    }
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("telemetry_relay=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("telemetry_relay=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
