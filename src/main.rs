use anyhow::{anyhow, Result};
use clap::{Arg, Command};
use ethers::types::H160;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lendwatch::{
    summarize, AlertEvaluator, ChatThresholds, Config, Position, PositionDiscoveryEngine,
    ThresholdConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("lendwatch")
        .version(env!("CARGO_PKG_VERSION"))
        .about("🩺 Lending position health checker for Monad protocols")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Config file path")
                .default_value("config/default.toml"),
        )
        .arg(
            Arg::new("address")
                .short('a')
                .long("address")
                .value_name("ADDRESS")
                .help("Wallet address to inspect")
                .required(true),
        )
        .arg(
            Arg::new("protocol")
                .short('p')
                .long("protocol")
                .value_name("PROTOCOL")
                .help("Limit discovery to one protocol (neverland, morpho, curvance, euler)"),
        )
        .arg(
            Arg::new("threshold")
                .short('t')
                .long("threshold")
                .value_name("HF")
                .help("Alert threshold override for this run"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)")
                .default_value("info"),
        )
        .get_matches();

    dotenvy::dotenv().ok();

    let log_level = matches
        .get_one::<String>("log-level")
        .map(String::as_str)
        .unwrap_or("info");
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("config/default.toml");
    let config = match Config::load(config_path).await {
        Ok(config) => {
            info!("📋 Config loaded from {}", config_path);
            config
        }
        Err(e) => {
            warn!("Config {} not usable ({}); falling back to defaults", config_path, e);
            Config::default()
        }
    };
    config.validate()?;

    let address_arg = matches
        .get_one::<String>("address")
        .ok_or_else(|| anyhow!("--address is required"))?;
    let wallet: H160 = address_arg
        .parse()
        .map_err(|_| anyhow!("invalid wallet address: {}", address_arg))?;

    let mut thresholds = ChatThresholds::default();
    let mut default_threshold = config.discovery.default_threshold;
    if let Some(raw) = matches.get_one::<String>("threshold") {
        default_threshold = raw
            .parse::<f64>()
            .map_err(|_| anyhow!("invalid threshold: {}", raw))?;
    }
    thresholds.set_address(
        address_arg,
        ThresholdConfig {
            default_threshold,
            ..ThresholdConfig::default()
        },
    );

    let engine = PositionDiscoveryEngine::from_config(&config)?;
    info!("🔍 Scanning {} across {:?}", address_arg, engine.protocol_ids());

    let protocol_filter = matches.get_one::<String>("protocol").map(String::as_str);
    let positions = engine.discover(wallet, protocol_filter).await?;

    if positions.is_empty() {
        println!("No active borrow positions found for {}", address_arg);
        return Ok(());
    }

    let summary = summarize(&positions);
    println!(
        "{} position(s), worst health factor {:.3} (as of {})",
        summary.total_positions,
        summary.worst_health_factor.unwrap_or(f64::NAN),
        summary.last_updated.format("%Y-%m-%d %H:%M:%S UTC"),
    );
    for position in &positions {
        println!("{}", render_position(position));
    }

    let alerts = AlertEvaluator::evaluate(&thresholds, address_arg, &positions);
    for alert in &alerts {
        println!("{}", alert.render());
    }
    if alerts.is_empty() {
        println!("✅ All positions above their thresholds");
    }

    Ok(())
}

fn render_position(position: &Position) -> String {
    let drop = position
        .liquidation_drop_pct
        .map(|pct| format!(" | {:.1}% to liquidation", pct))
        .unwrap_or_default();
    format!(
        "  [{}] {} | HF {:.3} | collateral {} {} | debt {} {}{}",
        position.protocol_name,
        position.market_name,
        position.health_factor,
        Position::format_amount(position.collateral.amount),
        position.collateral.symbol,
        Position::format_amount(position.debt.amount),
        position.debt.symbol,
        drop
    )
}
