// Composite ability scores built from normalized player data.
use clap::ValueEnum;
use serde::Serialize;
use tracing::debug;

use crate::normalize::{round2, NormStat, NormValue, NormalizedRecord};

/// Mean of the present values, two decimals. `None` when nothing is present.
pub fn average(values: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return None;
    }
    Some(round2(present.iter().sum::<f64>() / present.len() as f64))
}

/// Weighted mean over `(weight, value)` pairs. Absent values drop out of both sums.
pub fn weighted_average(pairs: &[(f64, Option<f64>)]) -> Option<f64> {
    let (total_weight, total_value) = pairs
        .iter()
        .filter_map(|&(w, v)| v.map(|v| (w, w * v)))
        .fold((0.0, 0.0), |(tw, tv), (w, wv)| (tw + w, tv + wv));
    if total_weight > 0.0 {
        Some(round2(total_value / total_weight))
    } else {
        None
    }
}

/// The model inputs, in the order they are fed to the regressor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Physical,
    SpeedAccel,
    Explosiveness,
    ReceptionValue,
    Catching,
    Yac,
    YardsPerRoute,
    StrengthOfSchedule,
}

impl Feature {
    pub const ALL: [Feature; 8] = [
        Feature::Physical,
        Feature::SpeedAccel,
        Feature::Explosiveness,
        Feature::ReceptionValue,
        Feature::Catching,
        Feature::Yac,
        Feature::YardsPerRoute,
        Feature::StrengthOfSchedule,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Feature::Physical => "physical",
            Feature::SpeedAccel => "speed_accel",
            Feature::Explosiveness => "explosiveness",
            Feature::ReceptionValue => "reception_value",
            Feature::Catching => "catching",
            Feature::Yac => "yac",
            Feature::YardsPerRoute => "yards_per_route",
            Feature::StrengthOfSchedule => "strength_of_schedule",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CompositeFeatures {
    pub physical: Option<f64>,
    pub speed_accel: Option<f64>,
    pub explosiveness: Option<f64>,
    pub reception_value: Option<f64>,
    pub catching: Option<f64>,
    pub yac: Option<f64>,
    pub yards_per_route: Option<f64>,
    pub strength_of_schedule: Option<f64>,
}

impl CompositeFeatures {
    pub fn get(&self, feature: Feature) -> Option<f64> {
        match feature {
            Feature::Physical => self.physical,
            Feature::SpeedAccel => self.speed_accel,
            Feature::Explosiveness => self.explosiveness,
            Feature::ReceptionValue => self.reception_value,
            Feature::Catching => self.catching,
            Feature::Yac => self.yac,
            Feature::YardsPerRoute => self.yards_per_route,
            Feature::StrengthOfSchedule => self.strength_of_schedule,
        }
    }

    fn fill_missing(&mut self, value: f64) {
        for slot in [
            &mut self.physical,
            &mut self.speed_accel,
            &mut self.explosiveness,
            &mut self.reception_value,
            &mut self.catching,
            &mut self.yac,
            &mut self.yards_per_route,
            &mut self.strength_of_schedule,
        ] {
            slot.get_or_insert(value);
        }
    }
}

/// What to do with a composite that has no data behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum MissingCompositePolicy {
    /// Leave it absent; the record cannot be scored by the model.
    #[default]
    Propagate,
    /// Substitute a neutral 0.5.
    DefaultMidpoint,
}

pub const MIDPOINT: f64 = 0.5;

/// How the professional target is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TargetStrategy {
    /// The provider's receiving grade alone.
    #[default]
    ProviderGrade,
    /// Weighted blend of the professional production scores.
    WeightedComposite,
}

/// Weights of the blended target, keyed by normalized professional metric.
pub const COMPOSITE_TARGET_WEIGHTS: [(&str, f64); 7] = [
    ("yds_rr", 2.0),
    ("yac_rec", 1.0),
    ("yptoe", 4.0),
    ("xfp_rr", 6.0),
    ("pff_recv", 8.0),
    ("ftn_dyar", 5.0),
    ("ftn_dvoa", 3.0),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfessionalOutcome {
    pub target: Option<f64>,
    pub routes_run: Option<f64>,
    pub yards_per_route: Option<f64>,
    pub yac: Option<f64>,
    pub yptoe: Option<f64>,
    pub xfp_per_route: Option<f64>,
    pub provider_grade: Option<f64>,
    pub dyar: Option<f64>,
    pub dvoa: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefinedRecord {
    pub name: String,
    pub position: String,
    pub features: CompositeFeatures,
    pub outcome: Option<ProfessionalOutcome>,
}

impl RefinedRecord {
    pub fn target(&self) -> Option<f64> {
        self.outcome.as_ref().and_then(|o| o.target)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RefinerOptions {
    pub on_missing: MissingCompositePolicy,
    pub target: TargetStrategy,
}

/// Raw values that had no range, from the physical, combine and college blocks.
fn passthrough_values(player: &NormalizedRecord) -> Vec<(f64, &str)> {
    let college = player.college.values().flat_map(|stat| match stat {
        NormStat::Leaf(v) => vec![v],
        NormStat::Group(g) => g.values().collect(),
    });
    player
        .physical
        .values()
        .chain(player.combine.values())
        .chain(college)
        .filter_map(|value| match value {
            NormValue::Unmapped { raw, note } => Some((*raw, note.as_str())),
            _ => None,
        })
        .collect()
}

pub struct Refiner {
    options: RefinerOptions,
}

impl Refiner {
    pub fn new(options: RefinerOptions) -> Self {
        Self { options }
    }

    pub fn refine(&self, player: &NormalizedRecord) -> RefinedRecord {
        for (raw, note) in passthrough_values(player) {
            debug!(player = %player.general.name, raw, "{}; excluded from composites", note);
        }

        let physical: Vec<Option<f64>> = player.physical.values().map(NormValue::score).collect();

        let mut features = CompositeFeatures {
            physical: average(&physical),
            speed_accel: average(&[player.combine_score("40yd"), player.combine_score("10yd")]),
            explosiveness: average(&[
                player.combine_score("shuttle"),
                player.combine_score("vertical"),
                player.combine_score("broad"),
                player.combine_score("3cone"),
            ]),
            reception_value: player.college_group_score("pff", "recv"),
            catching: average(&[
                player.physical_score("hands"),
                player.physical_score("span"),
                player.college_group_score("pff", "drop"),
                player.college_score("ctc_pct"),
                player.college_score("drop_pct"),
            ]),
            yac: player.college_score("yac_rec"),
            yards_per_route: player.college_score("yds_rr"),
            strength_of_schedule: player.college_score("sos"),
        };

        if self.options.on_missing == MissingCompositePolicy::DefaultMidpoint {
            features.fill_missing(MIDPOINT);
        }

        RefinedRecord {
            name: player.general.name.clone(),
            position: player.general.position.clone(),
            features,
            outcome: self.outcome(player),
        }
    }

    fn outcome(&self, player: &NormalizedRecord) -> Option<ProfessionalOutcome> {
        let pro = player.professional.as_ref()?;
        let score = |key: &str| player.professional_score(key);

        let target = match self.options.target {
            TargetStrategy::ProviderGrade => score("pff_recv"),
            TargetStrategy::WeightedComposite => weighted_average(
                &COMPOSITE_TARGET_WEIGHTS
                    .iter()
                    .map(|&(key, w)| (w, score(key)))
                    .collect::<Vec<_>>(),
            ),
        };

        Some(ProfessionalOutcome {
            target,
            routes_run: pro.routes_run,
            yards_per_route: score("yds_rr"),
            yac: score("yac_rec"),
            yptoe: score("yptoe"),
            xfp_per_route: score("xfp_rr"),
            provider_grade: score("pff_recv"),
            dyar: score("ftn_dyar"),
            dvoa: score("ftn_dvoa"),
        })
    }

    pub fn refine_all(&self, players: &[NormalizedRecord]) -> Vec<RefinedRecord> {
        players.iter().map(|p| self.refine(p)).collect()
    }
}
