/// Load scouting data, normalize, refine, train, evaluate and rank unproven prospects.
use std::error::Error;
use std::fs;

use clap::Parser;
use tracing::{info, Level};

mod config;
mod error;
mod io;
mod model;
mod normalize;
mod partition;
mod plot;
mod refine;

use config::{Cli, PipelineOptions};
use error::ScoutResult;
use io::{load_players, load_ranges, write_rankings, write_refined, PlayerRecord};
use model::{evaluate, predict, train, Evaluation, Prediction, Training};
use normalize::{Normalizer, RangeTable};
use partition::{partition, Partition};
use plot::{plot_coefficients, plot_residuals};
use refine::{Feature, RefinedRecord, Refiner};

struct PipelineReport {
    partition: Partition,
    training: Training,
    evaluation: Evaluation,
    prediction: Prediction,
}

/// Normalizer then refiner, one record at a time.
fn refine_players(players: &[PlayerRecord], ranges: &RangeTable, options: &PipelineOptions) -> Vec<RefinedRecord> {
    let normalized = Normalizer::new(ranges).normalize_players(players);
    Refiner::new(options.refiner).refine_all(&normalized)
}

fn run_pipeline(players: &[PlayerRecord], ranges: &RangeTable, options: &PipelineOptions) -> ScoutResult<PipelineReport> {
    let refined = refine_players(players, ranges, options);
    let split = partition(refined, options.min_routes_run);

    let training = train(&split.labeled, &options.training)?;
    let evaluation = evaluate(&training.model, &training.held_out)?;
    info!(
        mse = evaluation.mean_squared_error,
        r2 = evaluation.r_squared,
        "held-out evaluation"
    );

    let prediction = predict(&training.model, &split.unlabeled);
    info!(
        projected = prediction.ranked.len(),
        rejected = prediction.rejected.len(),
        "projected unlabeled players"
    );

    Ok(PipelineReport {
        partition: split,
        training,
        evaluation,
        prediction,
    })
}

fn print_report(report: &PipelineReport) {
    println!(
        "\nLabeled players: {}   Unlabeled players: {}",
        report.partition.labeled.len(),
        report.partition.unlabeled.len()
    );
    println!(
        "Training on {} players, holding out {}",
        report.training.train_size,
        report.training.held_out.names.len()
    );
    for r in &report.training.rejected {
        println!("  excluded from training: {}", r);
    }
    println!("Mean Squared Error (MSE): {:.4}", report.evaluation.mean_squared_error);
    println!("R-squared (R2) Score: {:.4}", report.evaluation.r_squared);

    println!("\nCoefficients (intercept {:.4}):", report.training.model.intercept());
    for (name, coef) in report.training.model.coefficients() {
        println!("{:<40} {:>8.4}", name, coef);
    }

    println!("\nProjected prospects:");
    print!("{:>4}  {:<28} {:>9}", "#", "player", "predicted");
    for f in Feature::ALL {
        print!(" {:>8.8}", f.name());
    }
    println!();
    for (i, p) in report.prediction.ranked.iter().enumerate() {
        print!("{:>4}  {:<28} {:>9.4}", i + 1, p.name, p.predicted);
        for v in p.features {
            print!(" {:>8.2}", v);
        }
        println!();
    }

    if !report.prediction.rejected.is_empty() {
        println!("\nNot projected:");
        for r in &report.prediction.rejected {
            println!("  {}", r);
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    let ranges = load_ranges(&cli.ranges)?;
    let players = load_players(&cli.players)?;

    let report = run_pipeline(&players, &ranges, &cli.pipeline_options())?;
    print_report(&report);

    if let Some(path) = &cli.output {
        write_rankings(path, &report.prediction.ranked)?;
        println!("Wrote {}", path.display());
    }

    if let Some(path) = &cli.dump_refined {
        let all: Vec<&RefinedRecord> = report
            .partition
            .labeled
            .iter()
            .chain(report.partition.unlabeled.iter())
            .collect();
        write_refined(path, &all)?;
    }

    if let Some(dir) = &cli.plot_dir {
        fs::create_dir_all(dir)?;
        plot_coefficients(&dir.join("coefficients.png"), &report.training.model.coefficients())?;
        plot_residuals(&dir.join("residuals.png"), &report.evaluation.residuals)?;
        println!("Wrote charts to {}", dir.display());
    }

    Ok(())
}

/// End-to-end tests over the whole pipeline
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::path::Path;

    use rand::{rngs::StdRng, Rng, SeedableRng};

    use crate::error::ScoutError;
    use crate::io::{FtnMetrics, General, PffGrades, ProfessionalStats, StatValue};
    use crate::model::TrainingConfig;
    use crate::normalize::{Category, Direction, NormValue, NormalizationRange};
    use crate::refine::{MissingCompositePolicy, RefinerOptions};

    fn ranges() -> RangeTable {
        let mut t = RangeTable::new();
        let mut add = |c: Category, k: &str, min: f64, max: f64, d: Direction| {
            t.insert(c, k, NormalizationRange::new(min, max, d).expect("valid range"));
        };
        use Category::*;
        use Direction::*;
        add(Physical, "height", 68.0, 77.0, HigherIsBetter);
        add(Physical, "weight", 170.0, 230.0, HigherIsBetter);
        add(Physical, "hands", 8.5, 10.5, HigherIsBetter);
        add(Physical, "arm", 29.0, 35.0, HigherIsBetter);
        add(Physical, "span", 70.0, 82.0, HigherIsBetter);
        add(Combine, "40yd", 4.25, 4.75, LowerIsBetter);
        add(Combine, "10yd", 1.45, 1.65, LowerIsBetter);
        add(Combine, "shuttle", 3.9, 4.5, LowerIsBetter);
        add(Combine, "vertical", 30.0, 43.0, HigherIsBetter);
        add(Combine, "broad", 115.0, 135.0, HigherIsBetter);
        add(Combine, "3cone", 6.5, 7.3, LowerIsBetter);
        add(College, "yac_rec", 2.0, 9.0, HigherIsBetter);
        add(College, "yds_rr", 1.0, 4.0, HigherIsBetter);
        add(College, "drop_pct", 0.0, 12.0, LowerIsBetter);
        add(College, "ctc_pct", 30.0, 75.0, HigherIsBetter);
        add(College, "sos", -5.0, 15.0, HigherIsBetter);
        add(College, "pff_recv", 55.0, 92.0, HigherIsBetter);
        add(College, "pff_drop", 40.0, 95.0, HigherIsBetter);
        add(Professional, "pff_recv", 45.0, 92.0, HigherIsBetter);
        add(Professional, "ftn_dyar", -150.0, 400.0, HigherIsBetter);
        add(Professional, "ftn_dvoa", -40.0, 40.0, HigherIsBetter);
        add(Professional, "yds_rr", 0.8, 3.0, HigherIsBetter);
        t
    }

    fn scalars(pairs: &[(&str, Option<f64>)]) -> BTreeMap<String, Option<f64>> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    /// A prospect with every measurable drawn from `rng`; `professional` carries
    /// `(grade, routes_run)` when the player has a pro sample.
    fn prospect(name: &str, rng: &mut StdRng, professional: Option<(f64, f64)>) -> PlayerRecord {
        let mut u = |lo: f64, hi: f64| Some(rng.random_range(lo..hi));
        let physical = scalars(&[
            ("height", u(68.0, 77.0)),
            ("weight", u(170.0, 230.0)),
            ("hands", u(8.5, 10.5)),
            ("arm", u(29.0, 35.0)),
            ("span", u(70.0, 82.0)),
        ]);
        let combine = scalars(&[
            ("40yd", u(4.25, 4.75)),
            ("10yd", u(1.45, 1.65)),
            ("shuttle", u(3.9, 4.5)),
            ("vertical", u(30.0, 43.0)),
            ("broad", u(115.0, 135.0)),
            ("3cone", u(6.5, 7.3)),
        ]);
        let mut college: BTreeMap<String, StatValue> = scalars(&[
            ("yac_rec", u(2.0, 9.0)),
            ("yds_rr", u(1.0, 4.0)),
            ("aDoT", u(6.0, 16.0)),
            ("drop_pct", u(0.0, 12.0)),
            ("ctc_pct", u(30.0, 75.0)),
            ("sos", u(-5.0, 15.0)),
        ])
        .into_iter()
        .map(|(k, v)| (k, StatValue::Scalar(v)))
        .collect();
        college.insert(
            "pff".into(),
            StatValue::Group(scalars(&[("recv", u(55.0, 92.0)), ("drop", u(40.0, 95.0)), ("fum", u(40.0, 95.0))])),
        );
        let professional = professional.map(|(grade, routes)| ProfessionalStats {
            pff: PffGrades { recv: Some(grade) },
            ftn: FtnMetrics { dyar: u(-150.0, 400.0), dvoa: u(-40.0, 40.0) },
            routes_run: Some(routes),
            metrics: scalars(&[("yds_rr", u(0.8, 3.0))]),
        });
        PlayerRecord {
            general: General { name: name.into(), position: "WR".into(), team: "State".into() },
            physical,
            combine,
            college,
            professional,
        }
    }

    /// Labeled players whose grade tracks college reception value, plus unproven prospects.
    fn population(seed: u64) -> Vec<PlayerRecord> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut players = Vec::new();
        for i in 0..30 {
            let mut p = prospect(&format!("Pro {:02}", i), &mut rng, Some((0.0, 0.0)));
            let recv = match &p.college["pff"] {
                StatValue::Group(g) => g["recv"].unwrap_or(70.0),
                StatValue::Scalar(_) => 70.0,
            };
            let routes = rng.random_range(60.0..600.0);
            if let Some(pro) = p.professional.as_mut() {
                pro.pff.recv = Some(45.0 + (recv - 55.0) * 1.1 + rng.random_range(-3.0..3.0));
                pro.routes_run = Some(routes);
            }
            players.push(p);
        }
        for i in 0..12 {
            players.push(prospect(&format!("Prospect {:02}", i), &mut rng, None));
        }
        players
    }

    fn options(min_routes_run: f64) -> PipelineOptions {
        PipelineOptions {
            refiner: RefinerOptions::default(),
            min_routes_run,
            training: TrainingConfig::default(),
        }
    }

    #[test]
    fn scenario_outcome_with_enough_routes_is_labeled_rookie_is_not() {
        let mut rng = StdRng::seed_from_u64(1);
        let players = vec![
            prospect("Veteran", &mut rng, Some((80.0, 150.0))),
            prospect("Rookie", &mut rng, None),
        ];
        let refined = refine_players(&players, &ranges(), &options(100.0));
        let split = partition(refined, 100.0);
        assert_eq!(split.labeled.len(), 1);
        assert_eq!(split.labeled[0].name, "Veteran");
        assert_eq!(split.labeled[0].target(), Some(0.74));
        assert_eq!(split.unlabeled.len(), 1);
        assert_eq!(split.unlabeled[0].name, "Rookie");
    }

    #[test]
    fn scenario_small_professional_sample_is_projected_instead() {
        let mut rng = StdRng::seed_from_u64(2);
        let players = vec![prospect("Cameo", &mut rng, Some((85.0, 50.0)))];
        let refined = refine_players(&players, &ranges(), &options(100.0));
        let split = partition(refined, 100.0);
        assert!(split.labeled.is_empty());
        assert_eq!(split.unlabeled.len(), 1);
        assert!(split.unlabeled[0].target().is_some());
    }

    #[test]
    fn scenario_absent_values_stay_absent_everywhere() {
        let t = ranges();
        let n = Normalizer::new(&t);
        for (category, attribute) in [
            (Category::Physical, "height"),
            (Category::Combine, "40yd"),
            (Category::College, "pff_recv"),
            (Category::Professional, "ftn_dvoa"),
            (Category::College, "aDoT"),
            (Category::Professional, "av"),
        ] {
            assert_eq!(n.normalize(category, attribute, None), NormValue::Missing);
        }
    }

    #[test]
    fn full_pipeline_ranks_every_complete_prospect() {
        let players = population(42);
        let report = run_pipeline(&players, &ranges(), &options(100.0)).expect("pipeline");
        assert_eq!(
            report.partition.labeled.len() + report.partition.unlabeled.len(),
            players.len()
        );
        assert_eq!(report.prediction.ranked.len(), report.partition.unlabeled.len());
        assert!(report.prediction.rejected.is_empty());
        assert!(report.evaluation.mean_squared_error.is_finite());
        let scores: Vec<f64> = report.prediction.ranked.iter().map(|p| p.predicted).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn rerunning_the_pipeline_reproduces_the_ranking() {
        let players = population(7);
        let a = run_pipeline(&players, &ranges(), &options(100.0)).expect("first run");
        let b = run_pipeline(&players, &ranges(), &options(100.0)).expect("second run");
        assert_eq!(a.prediction, b.prediction);
        assert_eq!(a.evaluation, b.evaluation);
        assert_eq!(a.training.held_out.names, b.training.held_out.names);
    }

    #[test]
    fn incomplete_prospects_are_rejected_by_name_under_propagation() {
        let mut players = population(9);
        let gap = players.len() - 1;
        players[gap].combine.clear();
        let name = players[gap].general.name.clone();

        let report = run_pipeline(&players, &ranges(), &options(100.0)).expect("pipeline");
        assert_eq!(report.prediction.rejected.len(), 1);
        assert_eq!(report.prediction.rejected[0].player, name);
        assert_eq!(report.prediction.rejected[0].feature, "speed_accel");
        assert!(report.prediction.ranked.iter().all(|p| p.name != name));

        let mut midpoint = options(100.0);
        midpoint.refiner.on_missing = MissingCompositePolicy::DefaultMidpoint;
        let report = run_pipeline(&players, &ranges(), &midpoint).expect("pipeline");
        let filled = report
            .prediction
            .ranked
            .iter()
            .find(|p| p.name == name)
            .expect("projected with midpoints");
        assert_eq!(filled.features[1], 0.5);
        assert_eq!(filled.features[2], 0.5);
    }

    #[test]
    fn no_usable_labels_aborts_with_insufficient_data() {
        let players = population(3);
        let err = run_pipeline(&players, &ranges(), &options(10_000.0)).err().expect("must fail");
        assert!(matches!(err, ScoutError::InsufficientData(_)));
    }

    #[test]
    fn shipped_sample_data_runs_end_to_end() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("data");
        let ranges = load_ranges(&root.join("norm_ranges.json")).expect("ranges");
        let players = load_players(&root.join("players.json")).expect("players");
        let report = run_pipeline(&players, &ranges, &options(100.0)).expect("pipeline");
        assert!(report.partition.labeled.len() >= 10);
        assert!(!report.prediction.ranked.is_empty());
    }
}
