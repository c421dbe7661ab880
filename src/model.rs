/// Train the projection regression, score the held-out split, rank unproven players.
use linfa::prelude::*;
use linfa_linear::{FittedLinearRegression, LinearRegression};
use ndarray::{Array1, Array2};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tracing::{info, warn};

use crate::error::{MissingFeature, ScoutError, ScoutResult};
use crate::refine::{Feature, RefinedRecord};

pub const N_FEATURES: usize = Feature::ALL.len();
pub const TEST_FRACTION: f64 = 0.2;
pub const DEFAULT_SEED: u64 = 42;

pub type FeatureRow = [f64; N_FEATURES];

#[derive(Debug, Clone, Copy)]
pub struct TrainingConfig {
    /// Polynomial degree of the feature expansion; 1 keeps the raw composites.
    pub degree: usize,
    pub test_fraction: f64,
    pub seed: u64,
    pub fit_intercept: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            degree: 1,
            test_fraction: TEST_FRACTION,
            seed: DEFAULT_SEED,
            fit_intercept: true,
        }
    }
}

impl TrainingConfig {
    fn validate(&self) -> ScoutResult<()> {
        if self.degree == 0 {
            return Err(ScoutError::Config("polynomial degree must be at least 1".into()));
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(ScoutError::Config(format!(
                "test fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        Ok(())
    }
}

/// The 8 composites in model order. Any gap rejects the record.
pub fn feature_vector(record: &RefinedRecord) -> Result<FeatureRow, MissingFeature> {
    let mut row = [0.0; N_FEATURES];
    for (slot, feature) in row.iter_mut().zip(Feature::ALL) {
        *slot = record.features.get(feature).ok_or_else(|| MissingFeature {
            player: record.name.clone(),
            feature: feature.name(),
        })?;
    }
    Ok(row)
}

fn to_matrix(rows: &[FeatureRow]) -> Array2<f64> {
    Array2::from_shape_fn((rows.len(), N_FEATURES), |(i, j)| rows[i][j])
}

/// Polynomial terms up to `degree`, without a bias column. Terms are ordered by degree,
/// then as lexicographic combinations with replacement of the input columns.
#[derive(Debug, Clone)]
pub struct PolynomialExpansion {
    n_inputs: usize,
    terms: Vec<Vec<usize>>,
}

impl PolynomialExpansion {
    pub fn new(n_inputs: usize, degree: usize) -> Self {
        let mut terms = Vec::new();
        for d in 1..=degree {
            let mut current = Vec::with_capacity(d);
            push_combinations(0, n_inputs, d, &mut current, &mut terms);
        }
        Self { n_inputs, terms }
    }

    pub fn n_outputs(&self) -> usize {
        self.terms.len()
    }

    pub fn transform(&self, x: &Array2<f64>) -> Array2<f64> {
        debug_assert_eq!(x.ncols(), self.n_inputs);
        Array2::from_shape_fn((x.nrows(), self.terms.len()), |(i, t)| {
            self.terms[t].iter().map(|&j| x[(i, j)]).product()
        })
    }

    /// `a`, `a^2`, `a*b`, `a^2*b`, ...
    pub fn term_names(&self, inputs: &[&str]) -> Vec<String> {
        self.terms
            .iter()
            .map(|term| {
                let mut parts: Vec<String> = Vec::new();
                let mut k = 0;
                while k < term.len() {
                    let idx = term[k];
                    let power = term[k..].iter().take_while(|&&j| j == idx).count();
                    parts.push(match power {
                        1 => inputs[idx].to_string(),
                        p => format!("{}^{}", inputs[idx], p),
                    });
                    k += power;
                }
                parts.join("*")
            })
            .collect()
    }
}

fn push_combinations(
    start: usize,
    n: usize,
    k: usize,
    current: &mut Vec<usize>,
    out: &mut Vec<Vec<usize>>,
) {
    if current.len() == k {
        out.push(current.clone());
        return;
    }
    for i in start..n {
        current.push(i);
        push_combinations(i, n, k, current, out);
        current.pop();
    }
}

/// Shuffles `0..n` with a seeded RNG and cuts off `ceil(n * test_fraction)` for testing.
pub fn split_indices(n: usize, test_fraction: f64, seed: u64) -> ScoutResult<(Vec<usize>, Vec<usize>)> {
    let n_test = (n as f64 * test_fraction).ceil() as usize;
    if n < 2 || n_test == 0 || n_test >= n {
        return Err(ScoutError::InsufficientData(format!(
            "{} labeled players cannot be split into training and held-out sets",
            n
        )));
    }
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let test = indices[..n_test].to_vec();
    let train = indices[n_test..].to_vec();
    Ok((train, test))
}

pub struct TrainedModel {
    expansion: PolynomialExpansion,
    fitted: FittedLinearRegression<f64>,
}

impl TrainedModel {
    /// Predictions for raw composite rows; the expansion is applied here.
    pub fn predict_features(&self, features: &Array2<f64>) -> Array1<f64> {
        let expanded = self.expansion.transform(features);
        self.fitted.predict(&expanded)
    }

    pub fn intercept(&self) -> f64 {
        self.fitted.intercept()
    }

    /// Fitted coefficients by term, largest magnitude first.
    pub fn coefficients(&self) -> Vec<(String, f64)> {
        let inputs: Vec<&str> = Feature::ALL.iter().map(|f| f.name()).collect();
        let mut coefs: Vec<(String, f64)> = self
            .expansion
            .term_names(&inputs)
            .into_iter()
            .zip(self.fitted.params().iter().copied())
            .collect();
        coefs.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
        coefs
    }
}

/// Held-out players, kept as raw composites so evaluation goes through the same
/// expansion as prediction.
#[derive(Debug, Clone)]
pub struct HeldOut {
    pub names: Vec<String>,
    pub features: Array2<f64>,
    pub targets: Array1<f64>,
}

pub struct Training {
    pub model: TrainedModel,
    pub held_out: HeldOut,
    pub train_size: usize,
    pub rejected: Vec<MissingFeature>,
}

pub fn train(labeled: &[RefinedRecord], config: &TrainingConfig) -> ScoutResult<Training> {
    config.validate()?;

    let mut rejected = Vec::new();
    let mut names = Vec::new();
    let mut rows = Vec::new();
    let mut targets = Vec::new();
    for record in labeled {
        let row = feature_vector(record).and_then(|row| {
            let target = record.target().ok_or_else(|| MissingFeature {
                player: record.name.clone(),
                feature: "target",
            })?;
            Ok((row, target))
        });
        match row {
            Ok((row, target)) => {
                names.push(record.name.clone());
                rows.push(row);
                targets.push(target);
            }
            Err(e) => {
                warn!("{}; excluded from training", e);
                rejected.push(e);
            }
        }
    }

    let (train_idx, test_idx) = split_indices(rows.len(), config.test_fraction, config.seed)?;
    let pick_rows = |idx: &[usize]| to_matrix(&idx.iter().map(|&i| rows[i]).collect::<Vec<_>>());
    let pick_targets = |idx: &[usize]| Array1::from_iter(idx.iter().map(|&i| targets[i]));

    let expansion = PolynomialExpansion::new(N_FEATURES, config.degree);
    let x_train = expansion.transform(&pick_rows(&train_idx));
    let dataset = Dataset::new(x_train, pick_targets(&train_idx));
    let fitted = LinearRegression::new()
        .with_intercept(config.fit_intercept)
        .fit(&dataset)?;

    info!(
        train = train_idx.len(),
        held_out = test_idx.len(),
        terms = expansion.n_outputs(),
        rejected = rejected.len(),
        "fitted projection model"
    );

    Ok(Training {
        model: TrainedModel { expansion, fitted },
        held_out: HeldOut {
            names: test_idx.iter().map(|&i| names[i].clone()).collect(),
            features: pick_rows(&test_idx),
            targets: pick_targets(&test_idx),
        },
        train_size: train_idx.len(),
        rejected,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub mean_squared_error: f64,
    pub r_squared: f64,
    /// `(predicted, residual)` per held-out player.
    pub residuals: Vec<(f64, f64)>,
}

pub fn evaluate(model: &TrainedModel, held_out: &HeldOut) -> ScoutResult<Evaluation> {
    let n = held_out.targets.len();
    if n == 0 {
        return Err(ScoutError::InsufficientData("no held-out players to evaluate".into()));
    }
    let predicted = model.predict_features(&held_out.features);
    let residuals = &held_out.targets - &predicted;

    let ss_res = residuals.mapv(|r| r * r).sum();
    let mean = held_out.targets.sum() / n as f64;
    let ss_tot = held_out.targets.mapv(|y| (y - mean).powi(2)).sum();
    let r_squared = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    };

    Ok(Evaluation {
        mean_squared_error: ss_res / n as f64,
        r_squared,
        residuals: predicted.iter().copied().zip(residuals.iter().copied()).collect(),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedProspect {
    pub name: String,
    pub predicted: f64,
    pub features: FeatureRow,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Prediction {
    /// Best projection first; ties by name.
    pub ranked: Vec<RankedProspect>,
    pub rejected: Vec<MissingFeature>,
}

pub fn predict(model: &TrainedModel, unlabeled: &[RefinedRecord]) -> Prediction {
    let mut rejected = Vec::new();
    let mut scorable: Vec<(String, FeatureRow)> = Vec::new();
    for record in unlabeled {
        match feature_vector(record) {
            Ok(row) => scorable.push((record.name.clone(), row)),
            Err(e) => {
                warn!("{}; not projected", e);
                rejected.push(e);
            }
        }
    }
    if scorable.is_empty() {
        return Prediction { ranked: Vec::new(), rejected };
    }

    let rows: Vec<FeatureRow> = scorable.iter().map(|(_, row)| *row).collect();
    let scores = model.predict_features(&to_matrix(&rows));

    let mut ranked: Vec<RankedProspect> = scorable
        .into_iter()
        .zip(scores.iter().copied())
        .map(|((name, features), predicted)| RankedProspect { name, predicted, features })
        .collect();
    ranked.sort_by(|a, b| {
        b.predicted
            .total_cmp(&a.predicted)
            .then_with(|| a.name.cmp(&b.name))
    });

    Prediction { ranked, rejected }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refine::{CompositeFeatures, ProfessionalOutcome};
    use rand::Rng;

    const WEIGHTS: FeatureRow = [0.3, -0.2, 0.5, 0.8, 0.1, -0.4, 0.6, 0.2];
    const BIAS: f64 = 0.05;

    fn truth(row: &FeatureRow) -> f64 {
        BIAS + row.iter().zip(WEIGHTS.iter()).map(|(x, w)| x * w).sum::<f64>()
    }

    fn composites(row: &FeatureRow) -> CompositeFeatures {
        CompositeFeatures {
            physical: Some(row[0]),
            speed_accel: Some(row[1]),
            explosiveness: Some(row[2]),
            reception_value: Some(row[3]),
            catching: Some(row[4]),
            yac: Some(row[5]),
            yards_per_route: Some(row[6]),
            strength_of_schedule: Some(row[7]),
        }
    }

    fn labeled(name: &str, row: FeatureRow, target: f64) -> RefinedRecord {
        RefinedRecord {
            name: name.into(),
            position: "WR".into(),
            features: composites(&row),
            outcome: Some(ProfessionalOutcome {
                target: Some(target),
                routes_run: Some(300.0),
                yards_per_route: None,
                yac: None,
                yptoe: None,
                xfp_per_route: None,
                provider_grade: Some(target),
                dyar: None,
                dvoa: None,
            }),
        }
    }

    fn unlabeled(name: &str, row: FeatureRow) -> RefinedRecord {
        RefinedRecord {
            name: name.into(),
            position: "WR".into(),
            features: composites(&row),
            outcome: None,
        }
    }

    fn linear_population(n: usize, seed: u64) -> Vec<RefinedRecord> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|i| {
                let mut row = [0.0; N_FEATURES];
                for x in row.iter_mut() {
                    *x = rng.random_range(0.0..1.0);
                }
                labeled(&format!("pro{}", i), row, truth(&row))
            })
            .collect()
    }

    #[test]
    fn expansion_orders_terms_by_degree_then_lexicographically() {
        let poly = PolynomialExpansion::new(3, 2);
        assert_eq!(poly.n_outputs(), 9);
        let x = Array2::from_shape_vec((1, 3), vec![2.0, 3.0, 5.0]).unwrap();
        let out = poly.transform(&x);
        assert_eq!(out.row(0).to_vec(), vec![2.0, 3.0, 5.0, 4.0, 6.0, 10.0, 9.0, 15.0, 25.0]);
        assert_eq!(
            poly.term_names(&["a", "b", "c"]),
            ["a", "b", "c", "a^2", "a*b", "a*c", "b^2", "b*c", "c^2"]
        );
        assert_eq!(PolynomialExpansion::new(2, 3).term_names(&["a", "b"])[6], "a^2*b");
        assert_eq!(PolynomialExpansion::new(N_FEATURES, 2).n_outputs(), 44);
    }

    #[test]
    fn degree_one_is_the_identity() {
        let poly = PolynomialExpansion::new(N_FEATURES, 1);
        let x = to_matrix(&[[0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8]]);
        assert_eq!(poly.transform(&x), x);
    }

    #[test]
    fn missing_composites_name_player_and_feature() {
        let mut r = unlabeled("gap", [0.5; N_FEATURES]);
        r.features.catching = None;
        assert_eq!(
            feature_vector(&r),
            Err(MissingFeature { player: "gap".into(), feature: "catching" })
        );
        assert_eq!(feature_vector(&unlabeled("ok", [0.5; N_FEATURES])), Ok([0.5; N_FEATURES]));
    }

    #[test]
    fn split_holds_out_a_fifth_reproducibly() {
        let (train, test) = split_indices(10, TEST_FRACTION, 7).unwrap();
        assert_eq!((train.len(), test.len()), (8, 2));
        let mut all: Vec<usize> = train.iter().chain(test.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());
        assert_eq!(split_indices(10, TEST_FRACTION, 7).unwrap(), (train, test));

        assert_eq!(split_indices(2, TEST_FRACTION, 1).map(|(a, b)| (a.len(), b.len())).unwrap(), (1, 1));
        assert!(matches!(split_indices(1, TEST_FRACTION, 1), Err(ScoutError::InsufficientData(_))));
        assert!(matches!(split_indices(0, TEST_FRACTION, 1), Err(ScoutError::InsufficientData(_))));
    }

    #[test]
    fn fits_linear_signal_and_evaluates_held_out() {
        let players = linear_population(40, 11);
        let training = train(&players, &TrainingConfig::default()).expect("training failed");
        assert_eq!(training.train_size, 32);
        assert_eq!(training.held_out.names.len(), 8);
        assert!(training.rejected.is_empty());

        let eval = evaluate(&training.model, &training.held_out).unwrap();
        assert!(eval.mean_squared_error < 1e-10, "mse {}", eval.mean_squared_error);
        assert!(eval.r_squared > 0.999_999, "r2 {}", eval.r_squared);
        assert_eq!(eval.residuals.len(), 8);
        assert!((training.model.intercept() - BIAS).abs() < 1e-6);

        let coefs = training.model.coefficients();
        assert_eq!(coefs[0].0, "reception_value");
        assert!((coefs[0].1 - 0.8).abs() < 1e-6);
    }

    #[test]
    fn training_is_deterministic_for_a_seed() {
        let players = linear_population(30, 3);
        let config = TrainingConfig { seed: 99, ..Default::default() };
        let a = train(&players, &config).unwrap();
        let b = train(&players, &config).unwrap();
        assert_eq!(a.held_out.names, b.held_out.names);
        assert_eq!(a.model.coefficients(), b.model.coefficients());
    }

    #[test]
    fn incomplete_labeled_records_are_rejected_not_fatal() {
        let mut players = linear_population(30, 5);
        players[4].features.yac = None;
        if let Some(o) = players[9].outcome.as_mut() {
            o.target = None;
        }
        let training = train(&players, &TrainingConfig::default()).unwrap();
        assert_eq!(training.rejected.len(), 2);
        assert_eq!(training.rejected[0].feature, "yac");
        assert_eq!(training.rejected[1].feature, "target");
        assert_eq!(training.train_size + training.held_out.names.len(), 28);
    }

    #[test]
    fn too_few_labels_is_an_error() {
        let players = linear_population(1, 5);
        assert!(matches!(
            train(&players, &TrainingConfig::default()),
            Err(ScoutError::InsufficientData(_))
        ));
        assert!(matches!(
            train(&players, &TrainingConfig { degree: 0, ..Default::default() }),
            Err(ScoutError::Config(_))
        ));
    }

    #[test]
    fn predictions_rank_best_projection_first() {
        let training = train(&linear_population(40, 21), &TrainingConfig::default()).unwrap();

        let low = [0.1; N_FEATURES];
        let mid = [0.5; N_FEATURES];
        let mut high = [0.5; N_FEATURES];
        high[3] = 1.0;
        high[6] = 1.0;
        let mut gap = unlabeled("gap", mid);
        gap.features.physical = None;

        let prediction = predict(
            &training.model,
            &[unlabeled("low", low), gap, unlabeled("high", high), unlabeled("mid", mid)],
        );
        let order: Vec<&str> = prediction.ranked.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(order, ["high", "mid", "low"]);
        assert!((prediction.ranked[0].predicted - truth(&high)).abs() < 1e-6);
        assert_eq!(prediction.ranked[2].features, low);
        assert_eq!(prediction.rejected, vec![MissingFeature { player: "gap".into(), feature: "physical" }]);
    }

    #[test]
    fn ties_break_by_name_and_empty_input_is_empty() {
        let training = train(&linear_population(20, 8), &TrainingConfig::default()).unwrap();
        let row = [0.4; N_FEATURES];
        let prediction = predict(&training.model, &[unlabeled("zed", row), unlabeled("amy", row)]);
        let order: Vec<&str> = prediction.ranked.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(order, ["amy", "zed"]);
        assert_eq!(predict(&training.model, &[]), Prediction::default());
    }

    #[test]
    fn quadratic_expansion_recovers_a_curved_signal() {
        let mut rng = StdRng::seed_from_u64(17);
        let players: Vec<RefinedRecord> = (0..80)
            .map(|i| {
                let mut row = [0.0; N_FEATURES];
                for x in row.iter_mut() {
                    *x = rng.random_range(0.0..1.0);
                }
                let y = 0.5 * row[3] * row[3] + 0.25 * row[0] * row[6];
                labeled(&format!("q{}", i), row, y)
            })
            .collect();
        let training = train(&players, &TrainingConfig { degree: 2, ..Default::default() }).unwrap();
        let eval = evaluate(&training.model, &training.held_out).unwrap();
        assert!(eval.mean_squared_error < 1e-8, "mse {}", eval.mean_squared_error);
    }
}
