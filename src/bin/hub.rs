use clap::Parser;
use remediation_hub::{
    Remediator,
    collaborators::http::build_collaborators,
    config::{Config, read_config_file},
};
use tracing::{debug, info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,

    /// Process a single delivery envelope from this file and exit
    #[arg(long)]
    event: Option<String>,

    /// Log level for the hub targets
    #[arg(short, long, default_value_t = LevelFilter::TRACE)]
    verbosity: LevelFilter,
}

fn init(level: LevelFilter) {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("remediation_hub", level),
        ("hub", level),
        ("tower_http", LevelFilter::DEBUG),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init(args.verbosity);
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;
    let settings = config.resolve()?;
    let collaborators = build_collaborators(&config)?;
    let remediator = Remediator::new(settings, collaborators);

    match &args.event {
        Some(path) => process_event_file(&remediator, path).await,
        None => serve(&config, remediator).await,
    }
}

async fn process_event_file(remediator: &Remediator, path: &str) -> anyhow::Result<()> {
    use anyhow::Context;

    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    let envelope: serde_json::Value =
        serde_json::from_str(&content).with_context(|| format!("{path} is not valid JSON"))?;

    let response = remediator.handle_envelope(&envelope).await?;
    debug!("handler response: {response:?}");

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

#[cfg(feature = "api")]
async fn serve(config: &Config, remediator: Remediator) -> anyhow::Result<()> {
    use remediation_hub::api::{ApiConfig, ApiState, spawn_api_server};

    let api_config = ApiConfig::from_section(config.api.as_ref());
    if api_config.auth_token.is_none() {
        info!("no API secret configured, accepting unauthenticated requests");
    }

    let addr = spawn_api_server(api_config, ApiState::new(remediator)).await?;
    info!("accepting notifications on http://{addr}/api/v1/notifications");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    Ok(())
}

#[cfg(not(feature = "api"))]
async fn serve(_config: &Config, _remediator: Remediator) -> anyhow::Result<()> {
    anyhow::bail!("built without the `api` feature; use --event to process a single envelope")
}
