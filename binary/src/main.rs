use std::{path::PathBuf, process::ExitCode, time::Instant};

use clap::Parser;
use collaboration_mining::{
    bpmn::layout::layouter::LayoutOutcome, discover_collaboration,
    export_bpmn_path, export_collaboration_graph_to_ptml_path, load_parties,
    CollaborationMiningConfig, XESImportOptions,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "collaboration-mining")]
#[command(about = "Discover a BPMN collaboration diagram from one XES event log per party")]
#[command(version)]
struct Cli {
    /// Party and its event log as NAME=PATH (.xes or .xes.gz), repeat for every party
    #[arg(long = "party", value_parser = parse_party, required = true)]
    parties: Vec<(String, String)>,

    /// Output path of the BPMN collaboration diagram
    #[arg(long)]
    bpmn: PathBuf,

    /// Output path of the collaboration graph as PTML
    #[arg(long)]
    ptml: Option<PathBuf>,

    /// JSON file with a CollaborationMiningConfig (missing fields use defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Noise threshold (0.0 to 1.0), overrides the config file
    #[arg(long)]
    noise: Option<f64>,

    /// Log debug output of all mining stages
    #[arg(short, long)]
    verbose: bool,
}

fn parse_party(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => {
            Ok((name.to_string(), path.to_string()))
        }
        _ => Err(format!("expected NAME=PATH, got '{s}'")),
    }
}

fn load_config(cli: &Cli) -> Result<CollaborationMiningConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => CollaborationMiningConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => CollaborationMiningConfig::default(),
    };
    if let Some(noise) = cli.noise {
        config.mining.noise_threshold = noise;
    }
    Ok(config)
}

fn run(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(cli)?;
    let options = XESImportOptions {
        sort_events_with_timestamp_key: config
            .mining
            .sort_events_by_timestamp
            .then(|| config.mining.timestamp_key.clone()),
        ..Default::default()
    };

    let now = Instant::now();
    let parties = load_parties(&cli.parties, &options)?;
    info!(parties = parties.len(), elapsed = ?now.elapsed(), "imported event logs");

    let now = Instant::now();
    let discovery = discover_collaboration(&parties, &config)?;
    info!(elapsed = ?now.elapsed(), "discovery finished");
    for report in &discovery.reports {
        info!(process = report.process.as_str(), tree = %report.tree, "process tree");
        if !report.ambiguous_message_activities.is_empty() {
            warn!(
                process = report.process.as_str(),
                activities = ?report.ambiguous_message_activities,
                "activities both send and receive messages"
            );
        }
    }
    if let LayoutOutcome::Fallback(e) = &discovery.layout {
        warn!(error = %e, "diagram written without backend layout");
    }

    export_bpmn_path(&discovery.diagram, &cli.bpmn)?;
    info!(path = %cli.bpmn.display(), "wrote BPMN");
    if let Some(ptml) = &cli.ptml {
        export_collaboration_graph_to_ptml_path(&discovery.graph, ptml)?;
        info!(path = %ptml.display(), "wrote PTML");
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
