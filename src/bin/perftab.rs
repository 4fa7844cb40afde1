#![forbid(unsafe_code)]

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use perftab::generators::{
    AcademicParams, CoalitionsParams, CostBenefitParams, RankParams, StandardParams,
    TableauGenerator, ThreeObjectivesParams,
};
use perftab::{
    monty_hall, IncrementalGenerator, IncrementalQuantileEstimator, LawSpec,
    PerformanceQuantilesStore, QuantileBins, TableauModel,
};

#[derive(Parser)]
#[command(name = "perftab", version, about = "Random performance tableaux and quantile stores")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Standard,
    Rank,
    Academic,
    CostBenefit,
    ThreeObjectives,
    Coalitions,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a random performance tableau as JSON
    Generate {
        #[arg(long, value_enum, default_value = "standard")]
        kind: Kind,
        /// Number of actions (students for the academic kind)
        #[arg(long)]
        actions: Option<usize>,
        /// Number of criteria (courses for the academic kind)
        #[arg(long)]
        criteria: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
        /// uniform, normal, triangular or beta
        #[arg(long)]
        law: Option<String>,
        /// Probability of a missing evaluation
        #[arg(long)]
        missing: Option<f64>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Seed a quantile store from a tableau
    Quantiles {
        #[arg(long)]
        tableau: PathBuf,
        /// Bin label (quartiles, deciles, ...) or count
        #[arg(long, default_value = "deciles")]
        bins: String,
        #[arg(long)]
        upper_closed: bool,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 2)]
        digits: u32,
    },
    /// Draw new actions from a store's laws and merge them in
    Update {
        #[arg(long)]
        store: PathBuf,
        #[arg(long)]
        actions: usize,
        #[arg(long)]
        seed: Option<u64>,
        /// Weight of the current state in observations (0 re-seeds)
        #[arg(long)]
        history_size: Option<usize>,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value_t = 2)]
        digits: u32,
    },
    /// Print quantiles of a saved iq-agent state
    IqReport {
        #[arg(long)]
        state: PathBuf,
        #[arg(long = "p", required = true)]
        p: Vec<f64>,
    },
    /// Simulate the generalized Monty-Hall game
    MontyHall {
        #[arg(long, default_value_t = 6)]
        doors: usize,
        #[arg(long, default_value_t = 4)]
        clues: usize,
        #[arg(long, default_value_t = 1000)]
        trials: usize,
        #[arg(long)]
        seed: Option<u64>,
    },
}

struct GenerateArgs {
    actions: Option<usize>,
    criteria: Option<usize>,
    seed: Option<u64>,
    law: Option<LawSpec>,
    missing: Option<f64>,
}

fn generate(kind: Kind, args: GenerateArgs) -> Result<TableauModel, Box<dyn std::error::Error>> {
    let tableau = match kind {
        Kind::Standard => {
            let d = StandardParams::default();
            StandardParams {
                number_of_actions: args.actions.unwrap_or(d.number_of_actions),
                number_of_criteria: args.criteria.unwrap_or(d.number_of_criteria),
                common_mode: args.law.unwrap_or(d.common_mode.clone()),
                missing_data_probability: args.missing.unwrap_or(d.missing_data_probability),
                seed: args.seed,
                ..d
            }
            .generate()?
        }
        Kind::Rank => {
            let d = RankParams::default();
            RankParams {
                number_of_actions: args.actions.unwrap_or(d.number_of_actions),
                number_of_criteria: args.criteria.unwrap_or(d.number_of_criteria),
                missing_data_probability: args.missing.unwrap_or(d.missing_data_probability),
                seed: args.seed,
                ..d
            }
            .generate()?
        }
        Kind::Academic => {
            let d = AcademicParams::default();
            AcademicParams {
                number_of_students: args.actions.unwrap_or(d.number_of_students),
                number_of_courses: args.criteria.unwrap_or(d.number_of_courses),
                common_mode: args.law.unwrap_or(d.common_mode.clone()),
                missing_data_probability: args.missing.unwrap_or(d.missing_data_probability),
                seed: args.seed,
                ..d
            }
            .generate()?
        }
        Kind::CostBenefit => {
            let d = CostBenefitParams::default();
            CostBenefitParams {
                number_of_actions: args.actions.unwrap_or(d.number_of_actions),
                number_of_criteria: args.criteria.unwrap_or(d.number_of_criteria),
                common_mode: args.law.unwrap_or(d.common_mode.clone()),
                missing_data_probability: args.missing.unwrap_or(d.missing_data_probability),
                seed: args.seed,
                ..d
            }
            .generate()?
        }
        Kind::ThreeObjectives => {
            let d = ThreeObjectivesParams::default();
            ThreeObjectivesParams {
                number_of_actions: args.actions.unwrap_or(d.number_of_actions),
                number_of_criteria: args.criteria.unwrap_or(d.number_of_criteria),
                common_mode: args.law.unwrap_or(d.common_mode.clone()),
                missing_data_probability: args.missing.unwrap_or(d.missing_data_probability),
                seed: args.seed,
                ..d
            }
            .generate()?
        }
        Kind::Coalitions => {
            let d = CoalitionsParams::default();
            CoalitionsParams {
                number_of_actions: args.actions.unwrap_or(d.number_of_actions),
                number_of_criteria: args.criteria.unwrap_or(d.number_of_criteria),
                common_mode: args.law.unwrap_or(d.common_mode.clone()),
                missing_data_probability: args.missing.unwrap_or(d.missing_data_probability),
                seed: args.seed,
                ..d
            }
            .generate()?
        }
    };
    Ok(tableau)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            kind,
            actions,
            criteria,
            seed,
            law,
            missing,
            out,
        } => {
            let law = law.map(|name| name.parse::<LawSpec>()).transpose()?;
            let tableau = generate(
                kind,
                GenerateArgs {
                    actions,
                    criteria,
                    seed,
                    law,
                    missing,
                },
            )?;
            if tableau.truncation_fallbacks > 0 {
                info!(
                    fallbacks = tableau.truncation_fallbacks,
                    "truncated normal draws fell back to a scale endpoint"
                );
            }
            tableau.save_json(&out)?;
            info!(
                actions = tableau.actions.len(),
                criteria = tableau.criteria.len(),
                out = %out.display(),
                "wrote tableau"
            );
        }
        Commands::Quantiles {
            tableau,
            bins,
            upper_closed,
            out,
            digits,
        } => {
            let bins: QuantileBins = bins.parse()?;
            let model = TableauModel::load_json(&tableau)?;
            let store = model.compute_quantiles(bins, !upper_closed)?;
            store.save(&out, Some(digits))?;
            info!(bins = %bins, out = %out.display(), "wrote quantile store");
        }
        Commands::Update {
            store,
            actions,
            seed,
            history_size,
            out,
            digits,
        } => {
            let mut quantiles = PerformanceQuantilesStore::load(&store)?;
            let batch = IncrementalGenerator::from_store(&quantiles, seed).random_actions(actions)?;
            quantiles.update_quantiles(&batch, history_size)?;
            quantiles.save(&out, Some(digits))?;
            info!(actions, out = %out.display(), "updated quantile store");
        }
        Commands::IqReport { state, p } => {
            let mut agent = IncrementalQuantileEstimator::load(&state)?;
            for p in p {
                match agent.report(p) {
                    Some(q) => println!("{p}\t{q}"),
                    None => return Err("iq-agent state holds no observations".into()),
                }
            }
        }
        Commands::MontyHall {
            doors,
            clues,
            trials,
            seed,
        } => {
            let outcome = monty_hall(doors, clues, trials, seed)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
    }

    Ok(())
}
