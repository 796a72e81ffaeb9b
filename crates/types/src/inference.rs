//! Aggregated per-subject verdicts.

use serde::{Deserialize, Serialize};

use crate::report::Observation;

/// The aggregated verdict about a subject: a synthetic observation whose
/// metrics carry the winning status and mean score per metric name, plus
/// the set of observers that contributed to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inference {
    /// Identity of the observed entity.
    pub subject: String,

    /// Observers whose latest observations fed the verdict.
    pub observers: Vec<String>,

    /// The aggregated metrics; `observation.ts` is the aggregation time.
    pub observation: Observation,
}
