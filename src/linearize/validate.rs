use super::oracle::{EdgeCut, FlowGraph, ReachabilityOracle, WalkFlags};
use crate::jvm::code::{
    BasicBlock, CatchIdentity, ExceptionEntry, HandlerCoverage, Instruction, SynLabel,
};
use crate::jvm::Error;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Difference between a method body and its linearized version
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Mismatch {
    /// Label is reachable in one body but not the other
    MissingLabel {
        label: SynLabel,
        reachable_before: bool,
    },

    /// Block continues to different places
    FlowMismatch {
        label: SynLabel,
        expected: BTreeSet<SynLabel>,
        found: BTreeSet<SynLabel>,
    },

    /// Block is covered by different handlers, or by the same ones in a different order
    HandlerOrderMismatch {
        label: SynLabel,
        expected: Vec<CatchIdentity>,
        found: Vec<CatchIdentity>,
    },

    /// Fallthrough that doesn't go to the next block
    BrokenFallThrough { label: SynLabel, target: SynLabel },
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::MissingLabel {
                label,
                reachable_before: true,
            } => write!(f, "{} is no longer reachable", label),
            Mismatch::MissingLabel {
                label,
                reachable_before: false,
            } => write!(f, "{} became reachable", label),
            Mismatch::FlowMismatch {
                label,
                expected,
                found,
            } => write!(
                f,
                "{} continues to {:?} instead of {:?}",
                label, found, expected
            ),
            Mismatch::HandlerOrderMismatch {
                label,
                expected,
                found,
            } => write!(
                f,
                "{} is covered by {:?} instead of {:?}",
                label, found, expected
            ),
            Mismatch::BrokenFallThrough { label, target } => {
                write!(f, "{} falls through to {}, which is not next", label, target)
            }
        }
    }
}

/// A body, as far as the validator cares
pub struct Body<'a> {
    pub blocks: &'a [BasicBlock],
    pub exceptions: &'a [ExceptionEntry],
    pub end_label: Option<SynLabel>,
}

impl<'a> Body<'a> {
    fn coverage_by_label(&self) -> Result<HashMap<SynLabel, Vec<CatchIdentity>>, Error> {
        let coverage = HandlerCoverage::new(self.blocks, self.exceptions, self.end_label)?;
        Ok(self
            .blocks
            .iter()
            .enumerate()
            .map(|(position, block)| (block.label, coverage.at(position).to_vec()))
            .collect())
    }
}

/// Labels the input refers to explicitly: the entry, branch and switch targets, and handlers
fn retained_labels(before: &Body) -> BTreeSet<SynLabel> {
    let mut retained = BTreeSet::new();
    if let Some(entry) = before.blocks.first() {
        retained.insert(entry.label);
    }
    for block in before.blocks {
        for insn in &block.instructions {
            retained.extend(insn.jump_targets().targets().iter().copied());
        }
    }
    retained.extend(before.exceptions.iter().map(|entry| entry.handler));
    retained
}

/// Check that `after` is a faithful re-linearization of `before`
///
/// Returns every mismatch found (an empty vector means the bodies agree).
pub fn validate(before: &Body, after: &Body) -> Result<Vec<Mismatch>, Error> {
    let mut mismatches = vec![];

    let before_graph = FlowGraph::new(before.blocks, before.exceptions, before.end_label)?;
    let after_graph = FlowGraph::new(after.blocks, after.exceptions, after.end_label)?;
    let no_cut = EdgeCut::new();

    let reachable_before = match before.blocks.first() {
        Some(entry) => before_graph.reachable(entry.label, &no_cut, WalkFlags::FOLLOW_HANDLERS),
        None => Default::default(),
    };
    let reachable_after = match after.blocks.first() {
        Some(entry) => after_graph.reachable(entry.label, &no_cut, WalkFlags::FOLLOW_HANDLERS),
        None => Default::default(),
    };

    // Reachability and outgoing edges
    for label in retained_labels(before) {
        let was_reachable = reachable_before.contains_key(&label);
        let is_reachable = reachable_after.contains_key(&label);
        if was_reachable != is_reachable {
            mismatches.push(Mismatch::MissingLabel {
                label,
                reachable_before: was_reachable,
            });
            continue;
        }
        if !was_reachable {
            continue;
        }

        let expected = before_graph.successors(label, WalkFlags::FOLLOW_HANDLERS);
        let found = after_graph.successors(label, WalkFlags::FOLLOW_HANDLERS);
        if expected != found {
            mismatches.push(Mismatch::FlowMismatch {
                label,
                expected,
                found,
            });
        }
    }

    // Handler priority at every block
    let coverage_before = before.coverage_by_label()?;
    let coverage_after = after.coverage_by_label()?;
    for block in after.blocks {
        let expected = coverage_before
            .get(&block.label)
            .cloned()
            .unwrap_or_default();
        let found = coverage_after
            .get(&block.label)
            .cloned()
            .unwrap_or_default();
        if expected != found {
            mismatches.push(Mismatch::HandlerOrderMismatch {
                label: block.label,
                expected,
                found,
            });
        }
    }

    // Fallthroughs
    for (idx, block) in after.blocks.iter().enumerate() {
        if let Some(Instruction::FallThrough(target)) = block.terminator() {
            let next = after.blocks.get(idx + 1).map(|next| next.label);
            if next != Some(*target) {
                mismatches.push(Mismatch::BrokenFallThrough {
                    label: block.label,
                    target: *target,
                });
            }
        }
    }

    Ok(mismatches)
}
