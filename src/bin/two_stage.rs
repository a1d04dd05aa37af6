//! Two-stage task command line tool
//!
//! - `simulate`: synthetic cohort of hybrid-model agents, merged behaviour CSV
//! - `fit`: maximum-likelihood fits of the hybrid model
//! - `predictors`: trial-wise prediction errors from fitted parameters
//! - `stay`: stay-probability regression input
//! - `export-data`: padded JSON arrays for external fitting tools

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

use two_stage_task::analysis::{
    compute_predictors, write_predictors, write_with_events, ParamSource, ParamTable,
    RegressionData, StayTable,
};
use two_stage_task::config::{generate_sample_config, load_config, AppConfig};
use two_stage_task::dataset::{group_participants, read_behavior, FittingData, ParticipantData};
use two_stage_task::fitting::{fit, write_fit_results, FitVariant};
use two_stage_task::logging::{init_logging, LogFormat};
use two_stage_task::table::Table;
use two_stage_task::task::{
    read_itis, run_session, ParticipantConfig, RecordWriter, SimulatedParticipant,
};
use two_stage_task::{TaskConfig, TransitionModel, TrialSequence};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser)]
#[command(name = "two_stage")]
#[command(version, about = "Two-stage decision task tools", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "two_stage.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Output format (pretty, json, compact)
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Log file path (logs to both file and stdout)
    #[arg(long)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a cohort and write a merged behaviour CSV
    Simulate {
        #[arg(short, long, default_value = "simulated.csv")]
        output: PathBuf,
        /// Override participants per condition
        #[arg(long)]
        count: Option<usize>,
        /// Counterbalancing sheet; one session per row with its own
        /// participant, condition and transition model
        #[arg(long, value_name = "SHEET")]
        participants: Option<PathBuf>,
        /// Override the simulation seed
        #[arg(long)]
        seed: Option<u64>,
        /// Play the tutorial preset instead of the configured task
        #[arg(long)]
        tutorial: bool,
    },
    /// Fit the hybrid model to a merged behaviour CSV
    Fit {
        input: PathBuf,
        /// single, mixed or w_only
        #[arg(short, long, default_value = "single")]
        variant: FitVariant,
        #[arg(short, long, default_value = "params.csv")]
        output: PathBuf,
    },
    /// Compute trial-wise predictors from a parameter table
    Predictors {
        input: PathBuf,
        #[arg(short, long)]
        params: PathBuf,
        /// as_fitted or condition_mean
        #[arg(long, default_value = "as_fitted")]
        source: ParamSource,
        /// Event table whose rows receive the predictor columns
        #[arg(long)]
        events: Option<PathBuf>,
        #[arg(short, long, default_value = "predictors.csv")]
        output: PathBuf,
    },
    /// Write the stay regression input as JSON
    Stay {
        input: PathBuf,
        #[arg(short, long, default_value = "stay.json")]
        output: PathBuf,
    },
    /// Write padded fitting arrays as JSON
    ExportData {
        input: PathBuf,
        #[arg(short, long, default_value = "fitting_data.json")]
        output: PathBuf,
    },
    /// Generate a sample config file
    GenerateConfig {
        #[arg(short, long, default_value = "two_stage.toml")]
        output: PathBuf,
    },
    /// Validate config without running
    ValidateConfig,
}

// ============================================================================
// Main
// ============================================================================

fn main() -> CliResult<()> {
    let cli = Cli::parse();

    if let Commands::GenerateConfig { output } = &cli.command {
        generate_sample_config(output)?;
        println!("Sample config written to {}", output.display());
        return Ok(());
    }

    let mut config = load_config(&cli.config)?;
    apply_overrides(&mut config, &cli);
    config.validate()?;
    // Held until exit so the file writer drains
    let _log_guard = init_logging(&config.logging)?;

    match &cli.command {
        Commands::Simulate {
            output,
            count,
            participants,
            seed,
            tutorial,
        } => {
            if let Some(n) = count {
                config.simulation.participants = *n;
            }
            if let Some(seed) = seed {
                config.simulation.seed = *seed;
            }
            if *tutorial {
                config.task = TaskConfig {
                    iti_file: config.task.iti_file.clone(),
                    ..TaskConfig::tutorial()
                };
            }
            let sessions = match participants {
                Some(sheet) => sheet_sessions(&config.task, sheet)?,
                None => random_sessions(&config),
            };
            simulate(&config, sessions, output)
        }
        Commands::Fit {
            input,
            variant,
            output,
        } => {
            let participants = load_participants(input)?;
            let results = fit(&participants, *variant, &config.fitting)?;
            write_fit_results(BufWriter::new(File::create(output)?), &results)?;
            info!(results = results.len(), output = %output.display(), "parameters written");
            Ok(())
        }
        Commands::Predictors {
            input,
            params,
            source,
            events,
            output,
        } => {
            let participants = load_participants(input)?;
            let table = ParamTable::read(params)?;
            let results = compute_predictors(&participants, &table, *source)?;
            let writer = BufWriter::new(File::create(output)?);
            match events {
                Some(path) => {
                    write_with_events(writer, &Table::from_path(path)?, &results)?;
                }
                None => {
                    write_predictors(writer, &results)?;
                }
            }
            info!(participants = results.len(), output = %output.display(), "predictors written");
            Ok(())
        }
        Commands::Stay { input, output } => {
            let participants = load_participants(input)?;
            let table = StayTable::from_participants(&participants);
            for (rewarded, common) in [(true, true), (true, false), (false, true), (false, false)] {
                if let Some(p) = table.probability(rewarded, common) {
                    info!(rewarded, common, stay = p, "stay probability");
                }
            }
            match table.interaction() {
                Some(interaction) => info!(interaction, "reward × transition"),
                None => warn!("interaction undefined, some cells are empty"),
            }
            let data = RegressionData::from_participants(&participants);
            serde_json::to_writer(BufWriter::new(File::create(output)?), &data)?;
            Ok(())
        }
        Commands::ExportData { input, output } => {
            let participants = load_participants(input)?;
            FittingData::from_participants(&participants).write_json(output)?;
            info!(participants = participants.len(), output = %output.display(), "fitting data written");
            Ok(())
        }
        Commands::ValidateConfig => {
            println!("Configuration is valid:\n{config:#?}");
            Ok(())
        }
        Commands::GenerateConfig { .. } => Ok(()),
    }
}

/// CLI flags take precedence over the config file.
fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    if let Some(format) = cli.log_format {
        config.logging.format = format;
    }
    if let Some(file) = &cli.log_file {
        config.logging.log_file = Some(file.clone());
    }
}

fn load_participants(path: &Path) -> CliResult<Vec<ParticipantData>> {
    let rows = read_behavior(path)?;
    let participants = group_participants(&rows)?;
    info!(
        rows = rows.len(),
        participants = participants.len(),
        input = %path.display(),
        "behaviour loaded"
    );
    Ok(participants)
}

// ============================================================================
// Simulation
// ============================================================================

/// One simulated session; `model` is `None` for a fresh random model.
struct SessionPlan {
    participant: String,
    condition: String,
    model: Option<TransitionModel>,
}

fn random_sessions(config: &AppConfig) -> Vec<SessionPlan> {
    let sim = &config.simulation;
    sim.conditions
        .iter()
        .flat_map(|condition| std::iter::repeat(condition).take(sim.participants))
        .enumerate()
        .map(|(i, condition)| SessionPlan {
            participant: (i + 1).to_string(),
            condition: condition.clone(),
            model: None,
        })
        .collect()
}

/// Rebuilds every counterbalanced session listed in the sheet.
fn sheet_sessions(task: &TaskConfig, sheet: &Path) -> CliResult<Vec<SessionPlan>> {
    let rows = ParticipantConfig::read_all(&Table::from_path(sheet)?, task)?;
    let mut plans = Vec::with_capacity(rows.len());
    for row in rows {
        let model = TransitionModel::load(task, &row)?;
        info!(participant = %row.participant, model = %model, "counterbalanced session");
        plans.push(SessionPlan {
            participant: row.participant,
            condition: row.condition,
            model: Some(model),
        });
    }
    Ok(plans)
}

fn simulate(config: &AppConfig, sessions: Vec<SessionPlan>, output: &Path) -> CliResult<()> {
    let sim = &config.simulation;
    let itis = match &config.task.iti_file {
        Some(path) => read_itis(path)?,
        None => Vec::new(),
    };
    let mut rng = StdRng::seed_from_u64(sim.seed);
    let mut writer = RecordWriter::merged(BufWriter::new(File::create(output)?))?;

    let total = sessions.len();
    for plan in sessions {
        let (lo, hi) = sim.w_range;
        let w = if hi > lo { rng.gen_range(lo..=hi) } else { lo };
        let params = sim.params.with_w(w);

        let model = match plan.model {
            Some(model) => model,
            None => TransitionModel::create_random(&config.task, &mut rng),
        };
        let stream = StdRng::seed_from_u64(rng.gen());
        let mut sequence = TrialSequence::new(config.task.clone(), model, stream);
        let agent_rng = StdRng::seed_from_u64(rng.gen());
        let mut agent = SimulatedParticipant::new(params, sim.responses, agent_rng)?;

        let summary = run_session(&mut sequence, &mut agent, &itis, &mut rng)?;
        for record in &summary.records {
            writer.write_for(&plan.participant, &plan.condition, record)?;
        }
        info!(
            participant = %plan.participant,
            condition = %plan.condition,
            w,
            rewards = summary.rewards,
            slow_trials = summary.slow_trials,
            "participant simulated"
        );
    }

    writer.flush()?;
    info!(participants = total, output = %output.display(), "simulation written");
    Ok(())
}
