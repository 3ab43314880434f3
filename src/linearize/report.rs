use super::{Error, Mismatch};
use std::fmt;

/// What linearizing a single method did
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LinearizeStats {
    /// `goto`s to the next block, turned into fallthrough
    pub jumps_eliminated: usize,

    /// Fallthroughs whose target moved away, turned into `goto`s
    pub jumps_materialized: usize,

    /// Splits needed to express the exception table over the new order
    pub chains_split: usize,

    /// Handler regions scheduled separately from normal control flow
    pub handler_regions: usize,
}

/// Result of running the linearizer on one method
#[derive(Debug)]
pub enum MethodOutcome {
    /// New body is identical to the old one
    Unchanged,

    /// Body was replaced (mismatches, if any, were found by the validator after the fact)
    Changed {
        stats: LinearizeStats,
        mismatches: Vec<Mismatch>,
    },

    /// Method was left untouched
    Failed(Error),
}

/// Counters accumulated over a batch of methods
///
/// The caller owns this and threads it through every call. Counters only ever get added to, so
/// reports from separate batches can be combined with [`BatchReport::merge`] in any order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BatchReport {
    pub methods_seen: usize,
    pub methods_touched: usize,
    pub methods_failed: usize,
    pub jumps_eliminated: usize,
    pub jumps_materialized: usize,
    pub chains_split: usize,
    pub validation_mismatches: usize,
}

impl BatchReport {
    pub fn record(&mut self, outcome: &MethodOutcome) {
        self.methods_seen += 1;
        match outcome {
            MethodOutcome::Unchanged => (),
            MethodOutcome::Changed { stats, mismatches } => {
                self.methods_touched += 1;
                self.jumps_eliminated += stats.jumps_eliminated;
                self.jumps_materialized += stats.jumps_materialized;
                self.chains_split += stats.chains_split;
                self.validation_mismatches += mismatches.len();
            }
            MethodOutcome::Failed(_) => self.methods_failed += 1,
        }
    }

    pub fn merge(&mut self, other: &BatchReport) {
        self.methods_seen += other.methods_seen;
        self.methods_touched += other.methods_touched;
        self.methods_failed += other.methods_failed;
        self.jumps_eliminated += other.jumps_eliminated;
        self.jumps_materialized += other.jumps_materialized;
        self.chains_split += other.chains_split;
        self.validation_mismatches += other.validation_mismatches;
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} methods ({} changed, {} failed), {} jumps eliminated, {} jumps materialized, \
             {} chains split, {} validation mismatches",
            self.methods_seen,
            self.methods_touched,
            self.methods_failed,
            self.jumps_eliminated,
            self.jumps_materialized,
            self.chains_split,
            self.validation_mismatches
        )
    }
}
