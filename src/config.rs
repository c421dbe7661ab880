use std::path::PathBuf;

use clap::Parser;

use crate::model::{TrainingConfig, DEFAULT_SEED, TEST_FRACTION};
use crate::refine::{MissingCompositePolicy, RefinerOptions, TargetStrategy};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Project professional receiving output for college prospects", long_about = None)]
pub struct Cli {
    /// Player dataset, `.json` (nested records) or `.csv` (flat scouting sheet).
    #[arg(long, default_value = "data/players.json")]
    pub players: PathBuf,

    /// Normalization ranges, `{"ranges": {category: {attribute: [min, max, direction]}}}`.
    #[arg(long, default_value = "data/norm_ranges.json")]
    pub ranges: PathBuf,

    /// Routes run a professional sample needs before it counts as a training label.
    #[arg(long)]
    pub min_routes_run: f64,

    #[arg(long, value_enum, default_value_t = TargetStrategy::ProviderGrade)]
    pub target: TargetStrategy,

    #[arg(long, value_enum, default_value_t = MissingCompositePolicy::Propagate)]
    pub on_missing_composite: MissingCompositePolicy,

    /// Polynomial degree of the feature expansion.
    #[arg(long, default_value_t = 1)]
    pub degree: usize,

    #[arg(long, default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Fit through the origin.
    #[arg(long, default_value_t = false)]
    pub no_intercept: bool,

    /// Write the ranked projections to this CSV file.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Dump every refined player (composites and professional outcome) as JSON.
    #[arg(long)]
    pub dump_refined: Option<PathBuf>,

    /// Write coefficient and residual charts into this directory.
    #[arg(long)]
    pub plot_dir: Option<PathBuf>,

    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

/// Everything the pipeline needs besides its inputs.
#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub refiner: RefinerOptions,
    pub min_routes_run: f64,
    pub training: TrainingConfig,
}

impl Cli {
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            refiner: RefinerOptions {
                on_missing: self.on_missing_composite,
                target: self.target,
            },
            min_routes_run: self.min_routes_run,
            training: TrainingConfig {
                degree: self.degree,
                test_fraction: TEST_FRACTION,
                seed: self.seed,
                fit_intercept: !self.no_intercept,
            },
        }
    }
}
