// Module for loading and validating scouting data. Reads the nested player dataset (JSON) or a
// flat scouting sheet (CSV), the normalization ranges, and writes the ranked projection table.
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ScoutError, ScoutResult};
use crate::model::RankedProspect;
use crate::normalize::{RangeTable, RangesConfig};
use crate::refine::{Feature, RefinedRecord};

/// Identity of a player. `name` is the unique key across the dataset.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct General {
    pub name: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub team: String,
}

/// A college production value: either a plain metric or one provider's breakdown.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum StatValue {
    Scalar(Option<f64>),
    Group(BTreeMap<String, Option<f64>>),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct PffGrades {
    pub recv: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct FtnMetrics {
    pub dyar: Option<f64>,
    pub dvoa: Option<f64>,
}

/// Professional production. The two provider groups are shaped differently and are
/// kept as their own types; everything else is a flat metric.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ProfessionalStats {
    #[serde(default)]
    pub pff: PffGrades,
    #[serde(default)]
    pub ftn: FtnMetrics,
    /// Routes run; the sample size behind every other number here.
    #[serde(rename = "rr", default)]
    pub routes_run: Option<f64>,
    #[serde(flatten)]
    pub metrics: BTreeMap<String, Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PlayerRecord {
    pub general: General,
    #[serde(default)]
    pub physical: BTreeMap<String, Option<f64>>,
    #[serde(default)]
    pub combine: BTreeMap<String, Option<f64>>,
    #[serde(default)]
    pub college: BTreeMap<String, StatValue>,
    #[serde(default)]
    pub professional: Option<ProfessionalStats>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PlayerDataset {
    pub players: Vec<PlayerRecord>,
}

/// Loads players from `path`, picking the reader by file extension.
pub fn load_players(path: &Path) -> ScoutResult<Vec<PlayerRecord>> {
    let players = match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => load_scouting_csv(path)?,
        Some("json") => load_players_json(path)?,
        other => {
            return Err(ScoutError::Config(format!(
                "unsupported player file extension {:?} for '{}'",
                other,
                path.display()
            )))
        }
    };
    validate_players(&players)?;
    info!(count = players.len(), path = %path.display(), "loaded players");
    Ok(players)
}

pub fn load_players_json(path: &Path) -> ScoutResult<Vec<PlayerRecord>> {
    let file = File::open(path)?;
    let dataset: PlayerDataset = serde_json::from_reader(BufReader::new(file))?;
    Ok(dataset.players)
}

/// Composite inputs that must carry a value in at least one record, as `block.attribute`.
/// College provider grades use `college.<provider>.<grade>`.
const REQUIRED_INPUTS: [&str; 15] = [
    "physical.hands",
    "physical.span",
    "combine.40yd",
    "combine.10yd",
    "combine.shuttle",
    "combine.vertical",
    "combine.broad",
    "combine.3cone",
    "college.yac_rec",
    "college.yds_rr",
    "college.drop_pct",
    "college.ctc_pct",
    "college.sos",
    "college.pff.recv",
    "college.pff.drop",
];

impl PlayerRecord {
    /// Value at a dotted `block.attribute[.child]` path, if present.
    fn input(&self, path: &str) -> Option<f64> {
        let (block, rest) = path.split_once('.')?;
        match block {
            "physical" => self.physical.get(rest).copied().flatten(),
            "combine" => self.combine.get(rest).copied().flatten(),
            "college" => match (rest.split_once('.'), self.college.get(rest)) {
                (None, Some(StatValue::Scalar(v))) => *v,
                (Some((group, child)), _) => match self.college.get(group)? {
                    StatValue::Group(g) => g.get(child).copied().flatten(),
                    StatValue::Scalar(_) => None,
                },
                _ => None,
            },
            _ => None,
        }
    }

    fn block_is_empty(&self, block: &str) -> bool {
        match block {
            "physical" => self.physical.is_empty(),
            "combine" => self.combine.is_empty(),
            _ => self.college.is_empty(),
        }
    }
}

/// Structural checks that abort the run: an empty dataset, a duplicated player key, or a
/// block or composite input that no record carries.
pub fn validate_players(players: &[PlayerRecord]) -> ScoutResult<()> {
    if players.is_empty() {
        return Err(ScoutError::Validation("player dataset is empty".into()));
    }
    let mut seen = HashSet::new();
    for p in players {
        if p.general.name.trim().is_empty() {
            return Err(ScoutError::Validation("player with an empty name".into()));
        }
        if !seen.insert(p.general.name.as_str()) {
            return Err(ScoutError::Validation(format!(
                "duplicate player name '{}'",
                p.general.name
            )));
        }
    }

    for block in ["physical", "combine", "college"] {
        if players.iter().all(|p| p.block_is_empty(block)) {
            return Err(ScoutError::Validation(format!(
                "required field '{}' is absent from every player record",
                block
            )));
        }
    }
    for path in REQUIRED_INPUTS {
        if players.iter().all(|p| p.input(path).is_none()) {
            return Err(ScoutError::Validation(format!(
                "required field '{}' has no value in any player record",
                path
            )));
        }
    }
    Ok(())
}

pub fn load_ranges(path: &Path) -> ScoutResult<RangeTable> {
    let file = File::open(path).map_err(|e| {
        ScoutError::Config(format!("could not open ranges file '{}': {}", path.display(), e))
    })?;
    let config: RangesConfig = serde_json::from_reader(BufReader::new(file))?;
    let table = RangeTable::from_config(config)?;
    if table.is_empty() {
        warn!(path = %path.display(), "no usable ranges; every value will pass through raw");
    }
    info!(entries = table.len(), path = %path.display(), "loaded normalization ranges");
    Ok(table)
}

/// One row of the flat scouting sheet. Every numeric column is kept as text so a blank
/// or malformed cell becomes absent instead of rejecting the row.
#[derive(Debug, Deserialize)]
struct ScoutingRow {
    #[serde(rename = "Name")]        name: String,
    #[serde(rename = "Position", default)]    position: String,
    #[serde(rename = "Team", default)]        team: String,
    #[serde(rename = "Height", default)]      height: String,
    #[serde(rename = "Weight", default)]      weight: String,
    #[serde(rename = "Hands", default)]       hands: String,
    #[serde(rename = "Arm", default)]         arm: String,
    #[serde(rename = "Span", default)]        span: String,
    #[serde(rename = "40yd", default)]        forty: String,
    #[serde(rename = "10yd", default)]        ten: String,
    #[serde(rename = "Shuttle", default)]     shuttle: String,
    #[serde(rename = "Vertical", default)]    vertical: String,
    #[serde(rename = "Broad", default)]       broad: String,
    #[serde(rename = "Three Cone", default)]  three_cone: String,
    #[serde(rename = "YAC/REC", default)]     college_yac_rec: String,
    #[serde(rename = "Y/RR", default)]        college_yds_rr: String,
    #[serde(rename = "aDoT", default)]        college_adot: String,
    #[serde(rename = "Drop %", default)]      college_drop_pct: String,
    #[serde(rename = "CTC %", default)]       college_ctc_pct: String,
    #[serde(rename = "RTG", default)]         college_pass_rating: String,
    #[serde(rename = "SOS", default)]         college_sos: String,
    #[serde(rename = "RECV", default)]        college_pff_recv: String,
    #[serde(rename = "DROP", default)]        college_pff_drop: String,
    #[serde(rename = "FUM", default)]         college_pff_fum: String,
    #[serde(rename = "PFF", default)]         pro_pff_recv: String,
    #[serde(rename = "DYAR", default)]        pro_dyar: String,
    #[serde(rename = "DVOA", default)]        pro_dvoa: String,
    #[serde(rename = "Catch %", default)]     pro_catch_pct: String,
    #[serde(rename = "RR", default)]          pro_routes_run: String,
    #[serde(rename = "Yards", default)]       pro_yards: String,
    #[serde(rename = "YPRR", default)]        pro_yds_rr: String,
    #[serde(rename = "AV", default)]          pro_av: String,
    #[serde(rename = "YAC", default)]         pro_yac_rec: String,
    #[serde(rename = "YPTOE", default)]       pro_yptoe: String,
    #[serde(rename = "XFP/RR", default)]      pro_xfp_rr: String,
}

/// Blank, unparsable and non-finite cells are all absent.
fn cell(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn metrics<S: AsRef<str>, const N: usize>(pairs: [(&str, S); N]) -> BTreeMap<String, Option<f64>> {
    pairs.iter().map(|(k, v)| (k.to_string(), cell(v.as_ref()))).collect()
}

impl ScoutingRow {
    fn into_player(self) -> PlayerRecord {
        let physical = metrics([
            ("height", &self.height),
            ("weight", &self.weight),
            ("hands", &self.hands),
            ("arm", &self.arm),
            ("span", &self.span),
        ]);
        let combine = metrics([
            ("40yd", &self.forty),
            ("10yd", &self.ten),
            ("shuttle", &self.shuttle),
            ("vertical", &self.vertical),
            ("broad", &self.broad),
            ("3cone", &self.three_cone),
        ]);

        let mut college: BTreeMap<String, StatValue> = metrics([
            ("yac_rec", &self.college_yac_rec),
            ("yds_rr", &self.college_yds_rr),
            ("aDoT", &self.college_adot),
            ("drop_pct", &self.college_drop_pct),
            ("ctc_pct", &self.college_ctc_pct),
            ("pass_rating", &self.college_pass_rating),
            ("sos", &self.college_sos),
        ])
        .into_iter()
        .map(|(k, v)| (k, StatValue::Scalar(v)))
        .collect();
        college.insert(
            "pff".into(),
            StatValue::Group(metrics([
                ("recv", &self.college_pff_recv),
                ("drop", &self.college_pff_drop),
                ("fum", &self.college_pff_fum),
            ])),
        );

        let pro = ProfessionalStats {
            pff: PffGrades { recv: cell(&self.pro_pff_recv) },
            ftn: FtnMetrics { dyar: cell(&self.pro_dyar), dvoa: cell(&self.pro_dvoa) },
            routes_run: cell(&self.pro_routes_run),
            metrics: metrics([
                ("catch_pct", &self.pro_catch_pct),
                ("yards", &self.pro_yards),
                ("yds_rr", &self.pro_yds_rr),
                ("av", &self.pro_av),
                ("yac_rec", &self.pro_yac_rec),
                ("yptoe", &self.pro_yptoe),
                ("xfp_rr", &self.pro_xfp_rr),
            ]),
        };
        let has_pro = pro.pff.recv.is_some()
            || pro.ftn.dyar.is_some()
            || pro.ftn.dvoa.is_some()
            || pro.routes_run.is_some()
            || pro.metrics.values().any(Option::is_some);

        PlayerRecord {
            general: General {
                name: self.name.trim().to_string(),
                position: self.position.trim().to_string(),
                team: self.team.trim().to_string(),
            },
            physical,
            combine,
            college,
            professional: has_pro.then_some(pro),
        }
    }
}

pub fn load_scouting_csv(path: &Path) -> ScoutResult<Vec<PlayerRecord>> {
    let file = File::open(path)?;
    let mut rdr = ReaderBuilder::new()
        .delimiter(b',')
        .flexible(true)
        .has_headers(true)
        .from_reader(file);

    let headers = rdr.headers()?.clone();
    let expected_len = headers.len();

    let mut out = Vec::new();
    for result in rdr.records() {
        let raw: StringRecord = result?;
        let line = raw.position().map(|p| p.line()).unwrap_or(0);

        if raw.iter().all(|f| f.trim().is_empty()) {
            continue;
        }

        if raw.len() != expected_len {
            warn!(line, expected = expected_len, found = raw.len(), "skipping row with wrong field count");
            continue;
        }

        match raw.deserialize::<ScoutingRow>(Some(&headers)) {
            Ok(row) => out.push(row.into_player()),
            Err(e) => warn!(line, error = %e, "skipping malformed scouting row"),
        }
    }

    Ok(out)
}

/// Writes the ranked projection with the composite inputs alongside for audit.
pub fn write_rankings(path: &Path, ranked: &[RankedProspect]) -> ScoutResult<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    let mut header = vec!["rank".to_string(), "name".to_string(), "predicted".to_string()];
    header.extend(Feature::ALL.iter().map(|f| f.name().to_string()));
    wtr.write_record(&header)?;

    for (i, p) in ranked.iter().enumerate() {
        let mut row = vec![(i + 1).to_string(), p.name.clone(), format!("{:.4}", p.predicted)];
        row.extend(p.features.iter().map(|v| format!("{:.2}", v)));
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    info!(rows = ranked.len(), path = %path.display(), "wrote ranked projections");
    Ok(())
}

/// Dumps refined players (composites and professional outcome) as pretty JSON.
pub fn write_refined(path: &Path, records: &[&RefinedRecord]) -> ScoutResult<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, records)?;
    info!(rows = records.len(), path = %path.display(), "wrote refined players");
    Ok(())
}
