use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use rnn_sim::config::defaults;
use rnn_sim::single_unit::default_samples;
use rnn_sim::{LayerRole, Neuron, NeuronConfig, SingleUnitTrainer, Simulator};

/// Train one recurrent neuron on a fixed set of samples
#[derive(Parser, Debug)]
#[command(name = "single-unit", version, about)]
struct Args {
    /// Training steps to run
    #[arg(long, default_value_t = 10)]
    steps: usize,

    /// Learning rate of the neuron
    #[arg(long, default_value_t = 0.2)]
    learning_rate: f64,

    /// Drive the steps from the simulation clock instead of back to back
    #[arg(long, default_value_t = false)]
    clocked: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let neuron = Neuron::new(
        &NeuronConfig::new(0, LayerRole::Hidden, 3)
            .with_recurrent_inputs(3)
            .with_input_weights(vec![0.5, -0.3, 0.8])
            .with_recurrent_weights(vec![0.1, 0.1, 0.1])
            .with_bias(0.2),
    )?;
    let trainer = SingleUnitTrainer::new(neuron, default_samples(), args.learning_rate)?;

    let trainer = if args.clocked {
        let mut trainer = trainer.with_schedule(defaults::SINGLE_UNIT_STEP_INTERVAL, args.steps)?;
        let exit = Simulator::new(defaults::CLOCK_PERIOD, None)?.run(&mut trainer)?;
        println!("Exiting @ tick {} because {}", exit.tick, exit.cause);
        trainer
    } else {
        let mut trainer = trainer;
        trainer.run_steps(args.steps, args.learning_rate)?;
        trainer
    };

    for summary in trainer.steps() {
        println!("step {:>3}: loss {:.6}", summary.step, summary.loss);
    }
    let neuron = trainer.neuron();
    println!(
        "weights {:?}, recurrent {:?}, bias {:.6}",
        neuron.input_weights(),
        neuron.recurrent_weights(),
        neuron.bias()
    );
    Ok(())
}
