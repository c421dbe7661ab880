// Splits refined players into training labels and projection targets.
use tracing::{debug, info};

use crate::refine::RefinedRecord;

#[derive(Debug, Default)]
pub struct Partition {
    /// Players with a usable professional target.
    pub labeled: Vec<RefinedRecord>,
    /// Everyone else; these get projected.
    pub unlabeled: Vec<RefinedRecord>,
}

/// A player is labeled iff it has a target and at least `min_routes_run` routes behind it.
/// A missing route count counts as zero. Nobody is dropped.
pub fn partition(records: Vec<RefinedRecord>, min_routes_run: f64) -> Partition {
    let mut out = Partition::default();
    for record in records {
        let routes = record
            .outcome
            .as_ref()
            .and_then(|o| o.routes_run)
            .unwrap_or(0.0);
        if record.target().is_some() && routes >= min_routes_run {
            out.labeled.push(record);
        } else {
            if record.target().is_some() {
                debug!(player = %record.name, routes, min_routes_run, "sample too small to label");
            }
            out.unlabeled.push(record);
        }
    }
    info!(
        labeled = out.labeled.len(),
        unlabeled = out.unlabeled.len(),
        min_routes_run,
        "partitioned players"
    );
    out
}
