use std::{ops::ControlFlow, path::PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rand::{SeedableRng, rngs::StdRng};
use taxi_world_core::{
    agent::{RandomPolicy, rollout_with},
    config::{EvaluationConfig, TrainingConfig},
    encoding::STATE_COUNT,
    environment::TaxiEnv,
    inspect::inspect,
    learner::{QLearner, evaluate_table},
    persistence::{load_table, save_table},
    q_table::ValueTable,
    stats::{EpisodeOutcome, EpisodeRecord, moving_average},
};
use tracing_subscriber::EnvFilter;

mod viewer;

#[derive(Parser, Debug)]
#[command(name = "taxi-world", version, about = "Tabular Q-learning on a 10x10 taxi grid", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a value table and save it
    Train(TrainArgs),
    /// Run greedy episodes with a saved table
    Evaluate(EvaluateArgs),
    /// Print statistics about a saved table
    Inspect(InspectArgs),
    /// Print random-policy episodes step by step
    Rollout(RolloutArgs),
    /// Step through episodes interactively in the terminal
    Play(PlayArgs),
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// JSON file with training hyper-parameters
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    #[arg(long)]
    episodes: Option<usize>,
    #[arg(long)]
    alpha: Option<f64>,
    #[arg(long)]
    gamma: Option<f64>,
    #[arg(long)]
    epsilon_start: Option<f64>,
    #[arg(long)]
    epsilon_end: Option<f64>,
    #[arg(long)]
    epsilon_decay: Option<f64>,
    /// Step cap per training episode
    #[arg(long)]
    max_steps: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
    /// Continue training from an existing table
    #[arg(long, value_name = "FILE")]
    resume: Option<PathBuf>,
    /// Where to write the trained table
    #[arg(short, long, value_name = "FILE", default_value = "q_table.msgpack")]
    output: PathBuf,
    /// Optional CSV file for per-episode metrics
    #[arg(long, value_name = "FILE")]
    metrics: Option<PathBuf>,
    /// Log a progress line every N episodes; 0 draws a progress bar instead
    #[arg(long, value_name = "N")]
    log_every: Option<usize>,
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    #[arg(short, long, value_name = "FILE", default_value = "q_table.msgpack")]
    table: PathBuf,
    #[arg(long)]
    episodes: Option<usize>,
    #[arg(long)]
    max_steps: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct InspectArgs {
    #[arg(short, long, value_name = "FILE", default_value = "q_table.msgpack")]
    table: PathBuf,
    /// Number of random states to show
    #[arg(long, default_value_t = 5)]
    samples: usize,
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct RolloutArgs {
    #[arg(long, default_value_t = 1)]
    episodes: usize,
    #[arg(long, default_value_t = 50)]
    max_steps: usize,
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Args, Debug)]
struct PlayArgs {
    /// Table to act greedily with; random actions when omitted
    #[arg(short, long, value_name = "FILE")]
    table: Option<PathBuf>,
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Train(args) => train(args),
        Command::Evaluate(args) => evaluate(args),
        Command::Inspect(args) => inspect_table(args),
        Command::Rollout(args) => rollout(args),
        Command::Play(args) => {
            let table = args.table.as_deref().map(load).transpose()?;
            viewer::run(make_env(args.seed), table, args.seed.unwrap_or(0))
        }
    }
}

fn make_env(seed: Option<u64>) -> TaxiEnv {
    seed.map(TaxiEnv::with_seed).unwrap_or_default()
}

fn load(path: &std::path::Path) -> Result<ValueTable> {
    load_table(path, STATE_COUNT)
        .with_context(|| format!("cannot use value table {}", path.display()))
}

fn training_config(args: &TrainArgs) -> Result<TrainingConfig> {
    let mut config = match &args.config {
        Some(path) => TrainingConfig::load_from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => TrainingConfig::default(),
    };
    if let Some(v) = args.episodes {
        config.episodes = v;
    }
    if let Some(v) = args.alpha {
        config.alpha = v;
    }
    if let Some(v) = args.gamma {
        config.gamma = v;
    }
    if let Some(v) = args.epsilon_start {
        config.epsilon_start = v;
    }
    if let Some(v) = args.epsilon_end {
        config.epsilon_end = v;
    }
    if let Some(v) = args.epsilon_decay {
        config.epsilon_decay = v;
    }
    if let Some(v) = args.max_steps {
        config.max_steps_per_episode = v;
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if let Some(v) = args.log_every {
        config.log_every = v;
    }
    config.validate()?;
    Ok(config)
}

fn train(args: TrainArgs) -> Result<()> {
    let config = training_config(&args)?;

    let mut learner = match &args.resume {
        Some(path) => {
            tracing::info!(path = %path.display(), "resuming from existing table");
            QLearner::from_table(load(path)?, config.seed)
        }
        None => QLearner::new(config.seed),
    };
    let mut env = make_env(config.seed);

    // Progress bar and log lines share stderr; only one of them is used.
    let progress = if config.log_every == 0 {
        let pb = ProgressBar::new(config.episodes as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} episodes ({msg})")
                .context("invalid progress bar template")?
                .progress_chars("=>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut observer = |record: &EpisodeRecord, success_rate: f64, epsilon: f64| {
        if let Some(pb) = &progress {
            pb.inc(1);
            if record.episode % 100 == 0 {
                pb.set_message(format!("success {success_rate:.2}, eps {epsilon:.3}"));
            }
        }
        ControlFlow::Continue(())
    };
    let history = learner.train(&mut env, &config, &mut observer)?;
    if let Some(pb) = &progress {
        pb.finish_with_message(format!("success {:.2}", history.final_success_rate()));
    }

    save_table(learner.table(), &args.output)
        .with_context(|| format!("failed to save table to {}", args.output.display()))?;
    if let Some(metrics) = &args.metrics {
        history
            .write_csv(metrics)
            .with_context(|| format!("failed to write metrics to {}", metrics.display()))?;
    }

    let window = config.success_window.min(history.len());
    let recent_reward = moving_average(&history.total_rewards(), window).last().copied();
    let recent_length = moving_average(&history.lengths(), window).last().copied();
    println!(
        "Trained {} episodes, final success rate {:.2}, table saved to {}",
        history.len(),
        history.final_success_rate(),
        args.output.display()
    );
    if let (Some(reward), Some(length)) = (recent_reward, recent_length) {
        println!("Last {window} episodes: mean reward {reward:.2}, mean length {length:.1}");
    }
    Ok(())
}

fn evaluate(args: EvaluateArgs) -> Result<()> {
    let defaults = EvaluationConfig::default();
    let config = EvaluationConfig {
        episodes: args.episodes.unwrap_or(defaults.episodes),
        max_steps_per_episode: args.max_steps.unwrap_or(defaults.max_steps_per_episode),
    };
    let table = load(&args.table)?;
    let mut env = make_env(args.seed);

    let summary = evaluate_table(&table, &mut env, config.episodes, config.max_steps_per_episode);
    for record in &summary.episodes {
        println!(
            "Episode {}: reward = {:.2}, steps = {}, outcome = {:?}",
            record.episode + 1,
            record.total_reward,
            record.steps,
            record.outcome
        );
    }
    println!(
        "Mean reward {:.2}, mean steps {:.2}, success rate {:.2}",
        summary.mean_reward, summary.mean_steps, summary.success_rate
    );
    Ok(())
}

fn inspect_table(args: InspectArgs) -> Result<()> {
    let table = load(&args.table)?;
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_rng(&mut rand::rng()),
    };
    let report = inspect(&table, args.samples, &mut rng)?;

    println!("Shape: {} x {}", table.states(), table.actions());
    println!("Entries: {}", report.total_entries);
    println!(
        "Non-zero entries: {} ({:.2}%)",
        report.non_zero_entries, report.fill_percent
    );
    println!("Min {:.4}  Max {:.4}  Mean {:.6}", report.min, report.max, report.mean);
    for warning in &report.warnings {
        println!("WARNING: {warning}");
    }
    for sample in &report.samples {
        let obs = sample.observation;
        println!(
            "State {}: taxi {} passenger {} destination {} aboard {} -> {}",
            sample.state, obs.agent, obs.passenger, obs.destination, obs.passenger_aboard, sample.best_action
        );
        println!("  values: {:?}", sample.values);
    }
    Ok(())
}

fn rollout(args: RolloutArgs) -> Result<()> {
    let mut env = make_env(args.seed);
    let mut policy = RandomPolicy::new(args.seed.unwrap_or(0));

    for episode in 0..args.episodes {
        println!("===== Episode {} =====", episode + 1);
        let mut step_number = 0;
        let (record, _) = rollout_with(&mut env, &mut policy, episode, args.max_steps, |env, step| {
            if let Some(step) = step {
                step_number += 1;
                println!("Step {step_number}: {} -> reward {}", step.action, step.reward);
            }
            print!("{}", env.render_text());
        });
        match record.outcome {
            EpisodeOutcome::Success => println!("Passenger delivered!"),
            EpisodeOutcome::StepLimit => println!("Step limit reached."),
            EpisodeOutcome::Capped => {}
        }
        println!("Total reward: {:.2}\n", record.total_reward);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_config_defaults() {
        let cli = Cli::parse_from([
            "taxi-world",
            "train",
            "--episodes",
            "12",
            "--alpha",
            "0.5",
            "--seed",
            "4",
        ]);
        let Command::Train(args) = cli.command else {
            panic!("expected train command");
        };
        let config = training_config(&args).unwrap();
        assert_eq!(config.episodes, 12);
        assert_eq!(config.alpha, 0.5);
        assert_eq!(config.seed, Some(4));
        assert_eq!(config.gamma, TrainingConfig::default().gamma);
        assert_eq!(config.log_every, TrainingConfig::default().log_every);
    }

    #[test]
    fn log_interval_from_config_file_is_kept_unless_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.json");
        std::fs::write(&path, r#"{ "log_every": 250 }"#).unwrap();
        let path_arg = path.to_str().unwrap();

        let cli = Cli::parse_from(["taxi-world", "train", "--config", path_arg]);
        let Command::Train(args) = cli.command else {
            panic!("expected train command");
        };
        assert_eq!(training_config(&args).unwrap().log_every, 250);

        let cli = Cli::parse_from(["taxi-world", "train", "--config", path_arg, "--log-every", "0"]);
        let Command::Train(args) = cli.command else {
            panic!("expected train command");
        };
        assert_eq!(training_config(&args).unwrap().log_every, 0);
    }

    #[test]
    fn invalid_flag_values_are_rejected() {
        let cli = Cli::parse_from(["taxi-world", "train", "--gamma", "1.5"]);
        let Command::Train(args) = cli.command else {
            panic!("expected train command");
        };
        assert!(training_config(&args).is_err());
    }

    #[test]
    fn evaluating_a_missing_table_fails_clearly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.msgpack");
        let err = load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("not found"));
    }
}
