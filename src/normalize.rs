// Rule-based normalization of raw scouting values into [0, 1] scores, looked up in a RangeTable.
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{ScoutError, ScoutResult};
use crate::io::{FtnMetrics, General, PffGrades, PlayerRecord, ProfessionalStats, StatValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Physical,
    Combine,
    College,
    Professional,
}

impl Category {
    pub fn key(self) -> &'static str {
        match self {
            Category::Physical => "physical",
            Category::Combine => "combine",
            Category::College => "college_stats",
            Category::Professional => "nfl_stats",
        }
    }
}

impl FromStr for Category {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "physical" => Ok(Category::Physical),
            "combine" => Ok(Category::Combine),
            "college_stats" => Ok(Category::College),
            "nfl_stats" => Ok(Category::Professional),
            _ => Err(format!("Unknown category: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

impl Direction {
    /// Only the sign matters; zero is rejected.
    pub fn from_sign(sign: f64) -> Option<Self> {
        if sign > 0.0 {
            Some(Direction::HigherIsBetter)
        } else if sign < 0.0 {
            Some(Direction::LowerIsBetter)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizationRange {
    pub min: f64,
    pub max: f64,
    pub direction: Direction,
}

pub(crate) fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

impl NormalizationRange {
    pub fn new(min: f64, max: f64, direction: Direction) -> ScoutResult<Self> {
        if !min.is_finite() || !max.is_finite() || min >= max {
            return Err(ScoutError::Config(format!(
                "invalid normalization range [{}, {}]",
                min, max
            )));
        }
        Ok(Self { min, max, direction })
    }

    /// Maps `value` onto `[0, 1]`, two decimals.
    pub fn score(&self, value: f64) -> f64 {
        let forward = round2(((value - self.min) / (self.max - self.min)).clamp(0.0, 1.0));
        match self.direction {
            Direction::HigherIsBetter => forward,
            // Invert the rounded score so both directions mirror each other exactly. A
            // half-cent tie therefore rounds down on this side: ratio 0.125 scores 0.87.
            Direction::LowerIsBetter => round2(1.0 - forward),
        }
    }
}

/// `{"ranges": {"<category>": {"<attribute>": [min, max, direction]}}}`
#[derive(Debug, Deserialize)]
pub struct RangesConfig {
    pub ranges: BTreeMap<String, BTreeMap<String, (f64, f64, f64)>>,
}

/// Calibration ranges keyed by category, then attribute. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct RangeTable {
    ranges: HashMap<Category, HashMap<String, NormalizationRange>>,
}

impl RangeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: RangesConfig) -> ScoutResult<Self> {
        let mut table = Self::new();
        for (category, attrs) in config.ranges {
            let category = match category.parse::<Category>() {
                Ok(c) => c,
                Err(e) => {
                    warn!("{}; ignoring its ranges", e);
                    continue;
                }
            };
            for (attribute, (min, max, sign)) in attrs {
                let direction = Direction::from_sign(sign).ok_or_else(|| {
                    ScoutError::Config(format!(
                        "direction for {}.{} must be non-zero",
                        category.key(),
                        attribute
                    ))
                })?;
                let range = NormalizationRange::new(min, max, direction).map_err(|e| {
                    ScoutError::Config(format!("{}.{}: {}", category.key(), attribute, e))
                })?;
                table.insert(category, attribute, range);
            }
        }
        Ok(table)
    }

    pub fn insert(&mut self, category: Category, attribute: impl Into<String>, range: NormalizationRange) {
        self.ranges
            .entry(category)
            .or_default()
            .insert(attribute.into(), range);
    }

    pub fn get(&self, category: Category, attribute: &str) -> Option<&NormalizationRange> {
        self.ranges.get(&category)?.get(attribute)
    }

    pub fn len(&self) -> usize {
        self.ranges.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A normalized leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum NormValue {
    Missing,
    Score(f64),
    /// No range for this key; the raw value is kept alongside a diagnostic.
    Unmapped { raw: f64, note: String },
}

impl NormValue {
    /// The `[0, 1]` score, if there is one. Raw passthroughs are not scores.
    pub fn score(&self) -> Option<f64> {
        match self {
            NormValue::Score(s) => Some(*s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NormStat {
    Leaf(NormValue),
    Group(BTreeMap<String, NormValue>),
}

/// Professional stat providers with their own, differently shaped groups.
#[derive(Debug, Clone, Copy)]
pub enum ProviderGroup<'a> {
    Pff(&'a PffGrades),
    Ftn(&'a FtnMetrics),
}

impl ProviderGroup<'_> {
    pub fn tag(&self) -> &'static str {
        match self {
            ProviderGroup::Pff(_) => "pff",
            ProviderGroup::Ftn(_) => "ftn",
        }
    }

    pub fn metrics(&self) -> Vec<(&'static str, Option<f64>)> {
        match self {
            ProviderGroup::Pff(g) => vec![("recv", g.recv)],
            ProviderGroup::Ftn(g) => vec![("dyar", g.dyar), ("dvoa", g.dvoa)],
        }
    }
}

impl ProfessionalStats {
    pub fn providers(&self) -> [ProviderGroup<'_>; 2] {
        [ProviderGroup::Pff(&self.pff), ProviderGroup::Ftn(&self.ftn)]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedProfessional {
    pub scores: BTreeMap<String, NormValue>,
    /// Sample size, carried raw.
    pub routes_run: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRecord {
    pub general: General,
    pub physical: BTreeMap<String, NormValue>,
    pub combine: BTreeMap<String, NormValue>,
    pub college: BTreeMap<String, NormStat>,
    pub professional: Option<NormalizedProfessional>,
}

impl NormalizedRecord {
    pub fn physical_score(&self, attribute: &str) -> Option<f64> {
        self.physical.get(attribute).and_then(NormValue::score)
    }

    pub fn combine_score(&self, attribute: &str) -> Option<f64> {
        self.combine.get(attribute).and_then(NormValue::score)
    }

    pub fn college_score(&self, attribute: &str) -> Option<f64> {
        match self.college.get(attribute)? {
            NormStat::Leaf(v) => v.score(),
            NormStat::Group(_) => None,
        }
    }

    pub fn college_group_score(&self, group: &str, child: &str) -> Option<f64> {
        match self.college.get(group)? {
            NormStat::Group(g) => g.get(child).and_then(NormValue::score),
            NormStat::Leaf(_) => None,
        }
    }

    pub fn professional_score(&self, key: &str) -> Option<f64> {
        self.professional
            .as_ref()?
            .scores
            .get(key)
            .and_then(NormValue::score)
    }
}

pub struct Normalizer<'a> {
    ranges: &'a RangeTable,
}

impl<'a> Normalizer<'a> {
    pub fn new(ranges: &'a RangeTable) -> Self {
        Self { ranges }
    }

    pub fn normalize(&self, category: Category, attribute: &str, value: Option<f64>) -> NormValue {
        let Some(value) = value else {
            return NormValue::Missing;
        };
        match self.ranges.get(category, attribute) {
            Some(range) => NormValue::Score(range.score(value)),
            None => {
                debug!(category = category.key(), attribute, value, "no normalization range, passing raw value through");
                NormValue::Unmapped {
                    raw: value,
                    note: format!("no normalization range for {}.{}", category.key(), attribute),
                }
            }
        }
    }

    /// Scalars normalize directly; groups recurse with `<attribute>_<child>` keys.
    pub fn normalize_stat(&self, category: Category, attribute: &str, value: &StatValue) -> NormStat {
        match value {
            StatValue::Scalar(v) => NormStat::Leaf(self.normalize(category, attribute, *v)),
            StatValue::Group(children) => NormStat::Group(
                children
                    .iter()
                    .map(|(child, v)| {
                        let key = format!("{}_{}", attribute, child);
                        (child.clone(), self.normalize(category, &key, *v))
                    })
                    .collect(),
            ),
        }
    }

    pub fn normalize_flat(
        &self,
        category: Category,
        stats: &BTreeMap<String, Option<f64>>,
    ) -> BTreeMap<String, NormValue> {
        stats
            .iter()
            .map(|(k, v)| (k.clone(), self.normalize(category, k, *v)))
            .collect()
    }

    pub fn normalize_professional(&self, stats: &ProfessionalStats) -> NormalizedProfessional {
        let mut scores = self.normalize_flat(Category::Professional, &stats.metrics);
        for provider in stats.providers() {
            for (metric, value) in provider.metrics() {
                let key = format!("{}_{}", provider.tag(), metric);
                let score = self.normalize(Category::Professional, &key, value);
                scores.insert(key, score);
            }
        }
        NormalizedProfessional {
            scores,
            routes_run: stats.routes_run,
        }
    }

    pub fn normalize_player(&self, player: &PlayerRecord) -> NormalizedRecord {
        NormalizedRecord {
            general: player.general.clone(),
            physical: self.normalize_flat(Category::Physical, &player.physical),
            combine: self.normalize_flat(Category::Combine, &player.combine),
            college: player
                .college
                .iter()
                .map(|(k, v)| (k.clone(), self.normalize_stat(Category::College, k, v)))
                .collect(),
            professional: player
                .professional
                .as_ref()
                .map(|p| self.normalize_professional(p)),
        }
    }

    pub fn normalize_players(&self, players: &[PlayerRecord]) -> Vec<NormalizedRecord> {
        players.iter().map(|p| self.normalize_player(p)).collect()
    }
}
