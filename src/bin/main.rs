use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rnn_sim::config::TimingMode;
use rnn_sim::{ExitEvent, SimConfig, Simulator, Trainer, TrainingReport};

/// Train a recurrent network on a clocked simulator
#[derive(Parser, Debug)]
#[command(name = "rnn-sim", version, about)]
struct Args {
    /// TOML simulation config; built-in defaults are used when omitted
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the number of training epochs
    #[arg(long)]
    max_epochs: Option<usize>,

    /// Use one global learning rate instead of per-neuron rates
    #[arg(long)]
    learning_rate: Option<f64>,

    /// Make interconnect transfers instantaneous
    #[arg(long, default_value_t = false)]
    untimed: bool,

    /// Stop the simulation after this many ticks
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Print the run report as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(serde::Serialize)]
struct RunReport {
    exit: ExitEvent,
    training: TrainingReport,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let mut trainer = Trainer::from_config(&config).context("building trainer")?;
    let mut simulator =
        Simulator::new(config.simulation.clock_period, config.simulation.max_ticks)?;
    let exit = simulator.run(&mut trainer).context("simulation failed")?;
    let report = trainer.report();

    if args.json {
        let run = RunReport {
            exit,
            training: report,
        };
        println!("{}", serde_json::to_string_pretty(&run)?);
    } else {
        println!("Exiting @ tick {} because {}", exit.tick, exit.cause);
        println!("Epochs completed: {}", report.epochs_completed);
        if let (Some(first), Some(last)) = (report.epoch_losses.first(), report.final_loss) {
            println!("Initial loss: {first:.6}");
            println!("Final loss:   {last:.6}");
        }
        println!("Neuron cycles: {}", report.stats.neurons.cycles);
        println!(
            "Average recurrent latency: {:.1} ticks",
            report.stats.hidden_to_hidden.average_latency()
        );
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<SimConfig> {
    let mut config = match &args.config {
        Some(path) => SimConfig::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => {
            info!("No config given, using built-in defaults");
            SimConfig::default()
        }
    };

    if let Some(epochs) = args.max_epochs {
        config.training.max_epochs = epochs;
    }
    if let Some(rate) = args.learning_rate {
        config.training.learning_rate = Some(rate);
    }
    if args.untimed {
        config.network.timing = TimingMode::Untimed;
    }
    if let Some(ticks) = args.max_ticks {
        config.simulation.max_ticks = Some(ticks);
    }
    config.validate()?;
    Ok(config)
}
