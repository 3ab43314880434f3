//! Choose a new block order for a method and rebuild its exception table
//!
//! ### Pipeline
//!
//! Linearizing a method goes through the following stages, each consuming the output of the
//! previous one and asking the [`ReachabilityOracle`] whatever it needs along the way:
//!
//!   1. the scheduler orders the blocks reachable from the entry, turning as many `goto`s as it
//!      can into fallthrough
//!   2. handler regions which normal control flow never reaches are scheduled separately and
//!      spliced in after the code they protect
//!   3. every block keeps the same ordered list of catch identities it had before, so the
//!      exception table is rebuilt from those lists for the new order (splitting ranges where
//!      priorities would otherwise get inverted)
//!   4. the stages above run again on their own result until it stops moving
//!   5. optionally, the result is checked against the input
//!
//! ### Failure
//!
//! [`Linearizer::linearize`] only borrows the method, and [`Linearizer::apply`] swaps the new body
//! in only once everything succeeded. A method which can't be linearized is left untouched, and
//! the failure is recorded in the [`BatchReport`] without affecting any other method.

mod chains;
mod errors;
mod handlers;
mod oracle;
mod report;
mod scheduler;
mod settings;
mod validate;

pub use chains::*;
pub use errors::*;
pub use oracle::*;
pub use report::*;
pub use settings::*;
pub use validate::*;

use crate::jvm;
use crate::jvm::code::{
    BasicBlock, CatchIdentity, ExceptionEntry, HandlerCoverage, SynLabel, SynLabelGenerator,
};
use crate::jvm::model::{Class, Method};
use crate::jvm::BinaryName;
use handlers::place_handlers;
use log::{debug, error, trace, warn};
use scheduler::{count_rewrites, rewrite_terminators, schedule_region};
use std::collections::{HashMap, HashSet};

/// Most layout passes run over one method
const MAX_PASSES: usize = 4;

/// Method body laid out in its new order
#[derive(Debug)]
pub struct Linearized {
    pub blocks: Vec<BasicBlock>,
    pub exceptions: Vec<ExceptionEntry>,
    pub end_label: Option<SynLabel>,

    /// Generator for the method, accounting for any labels synthesized along the way
    pub label_generator: SynLabelGenerator,

    pub stats: LinearizeStats,
}

impl Linearized {
    pub fn body(&self) -> Body<'_> {
        Body {
            blocks: &self.blocks,
            exceptions: &self.exceptions,
            end_label: self.end_label,
        }
    }
}

/// Result of laying out a body once
struct Pass {
    blocks: Vec<BasicBlock>,
    exceptions: Vec<ExceptionEntry>,
    end_label: Option<SynLabel>,
    chains_split: usize,
    handler_regions: usize,
}

impl Pass {
    fn body(&self) -> Body<'_> {
        Body {
            blocks: &self.blocks,
            exceptions: &self.exceptions,
            end_label: self.end_label,
        }
    }

    fn same_layout(&self, other: &Pass) -> bool {
        self.blocks == other.blocks && self.exceptions == other.exceptions
    }
}

pub struct Linearizer {
    settings: Settings,
}

impl Linearizer {
    pub fn new(settings: Settings) -> Linearizer {
        Linearizer { settings }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Compute a new layout for a method, without touching the method
    ///
    /// Laying out a result again honours the fallthroughs it now has, which can still move a
    /// block or make a different jump explicit. Passes repeat until the layout comes back
    /// unchanged, so that linearizing the output has nothing left to do.
    pub fn linearize(&self, method: &Method) -> Result<Linearized, Error> {
        let input = Body {
            blocks: method.blocks(),
            exceptions: method.exceptions(),
            end_label: method.end_label(),
        };
        let mut label_generator = method.label_generator();
        let mut pass = self.pass(&input, &mut label_generator)?;

        for _ in 1..MAX_PASSES {
            let next = match self.pass(&pass.body(), &mut label_generator) {
                Ok(next) => next,
                Err(err) => {
                    debug!("keeping the layout as is, another pass failed: {}", err);
                    break;
                }
            };
            if next.same_layout(&pass) {
                break;
            }
            trace!("layout moved on another pass");
            pass = next;
        }

        let (jumps_eliminated, jumps_materialized) = count_rewrites(method.blocks(), &pass.blocks);
        Ok(Linearized {
            blocks: pass.blocks,
            exceptions: pass.exceptions,
            end_label: pass.end_label,
            label_generator,
            stats: LinearizeStats {
                jumps_eliminated,
                jumps_materialized,
                chains_split: pass.chains_split,
                handler_regions: pass.handler_regions,
            },
        })
    }

    /// Lay out a body once: order the blocks, rebuild the table, fix up terminators
    fn pass(&self, body: &Body, label_generator: &mut SynLabelGenerator) -> Result<Pass, Error> {
        let graph = FlowGraph::new(body.blocks, body.exceptions, body.end_label)?;
        let (order, handler_regions) = self.layout(body, &graph)?;

        // Every block must keep its original handlers, in the original priority order
        let coverage = HandlerCoverage::new(body.blocks, body.exceptions, body.end_label)?;
        let coverage_by_label: HashMap<SynLabel, &[CatchIdentity]> = body
            .blocks
            .iter()
            .enumerate()
            .map(|(position, block)| (block.label, coverage.at(position)))
            .collect();
        let new_coverage: Vec<Vec<CatchIdentity>> = order
            .iter()
            .map(|label| {
                coverage_by_label
                    .get(label)
                    .map_or_else(Vec::new, |identities| identities.to_vec())
            })
            .collect();

        let table =
            rebuild_exception_table(&order, &new_coverage, body.end_label, label_generator)?;

        let mut blocks: Vec<BasicBlock> = order
            .iter()
            .filter_map(|label| graph.block(*label).cloned())
            .collect();
        rewrite_terminators(&mut blocks);

        Ok(Pass {
            blocks,
            exceptions: table.entries,
            end_label: table.end_label,
            chains_split: table.chains_split,
            handler_regions,
        })
    }

    /// Order every block of a body, returning the order and the number of handler regions
    fn layout(&self, body: &Body, graph: &FlowGraph) -> Result<(Vec<SynLabel>, usize), Error> {
        let entry = match body.blocks.first() {
            Some(block) => block.label,
            None => return Err(Error::Malformed(jvm::Error::EmptyMethod)),
        };
        let mut placed: HashSet<SynLabel> = HashSet::new();
        let mut layout: Vec<SynLabel> = vec![];
        let mut handler_regions = 0;

        let region = schedule_region(graph, entry, &mut placed, &self.settings);
        layout.extend(region.iter().copied());
        handler_regions += place_handlers(graph, &region, &mut layout, &mut placed, &self.settings);

        // Sweep up reachable blocks that no region picked up
        while let Some(seed) = next_unplaced(graph, &layout, &placed) {
            let region = schedule_region(graph, seed, &mut placed, &self.settings);
            layout.extend(region.iter().copied());
            handler_regions += 1;
            handler_regions +=
                place_handlers(graph, &region, &mut layout, &mut placed, &self.settings);
        }

        match body.blocks.iter().find(|block| !placed.contains(&block.label)) {
            Some(block) => Err(Error::UnscheduledBlock(block.label)),
            None => Ok((layout, handler_regions)),
        }
    }

    /// Linearize a method in place
    ///
    /// On failure, the method is left exactly as it was. Either way, the outcome is logged under
    /// the qualified method name and recorded into `report`.
    pub fn apply(
        &self,
        class: &BinaryName,
        method: &mut Method,
        report: &mut BatchReport,
    ) -> MethodOutcome {
        let name = method.qualified_name(class);
        let linearized = self.linearize(method);
        self.finish(&name, method, linearized, report)
    }

    /// Swap a linearized body into its method (unless linearizing failed), then log and record
    /// the outcome
    fn finish(
        &self,
        name: &str,
        method: &mut Method,
        linearized: Result<Linearized, Error>,
        report: &mut BatchReport,
    ) -> MethodOutcome {
        let outcome = linearized
            .and_then(|linearized| self.commit(name, method, linearized))
            .unwrap_or_else(MethodOutcome::Failed);

        match &outcome {
            MethodOutcome::Unchanged => debug!("{}: unchanged", name),
            MethodOutcome::Changed { stats, mismatches } => {
                debug!(
                    "{}: {} jumps eliminated, {} materialized, {} chains split",
                    name, stats.jumps_eliminated, stats.jumps_materialized, stats.chains_split
                );
                for mismatch in mismatches {
                    warn!("{}: validation mismatch: {}", name, mismatch);
                }
            }
            MethodOutcome::Failed(err @ Error::UnrepresentableExceptionTable { .. }) => {
                error!("{}: {}", name, err)
            }
            MethodOutcome::Failed(err) => warn!("{}: {}", name, err),
        }

        report.record(&outcome);
        outcome
    }

    fn commit(
        &self,
        name: &str,
        method: &mut Method,
        linearized: Linearized,
    ) -> Result<MethodOutcome, Error> {
        let changed =
            linearized.blocks != method.blocks() || linearized.exceptions != method.exceptions();
        if !changed {
            return Ok(MethodOutcome::Unchanged);
        }
        if linearized.stats.chains_split > 0 {
            warn!(
                "{}: irregular exception table ({} chains split)",
                name, linearized.stats.chains_split
            );
        }

        let mismatches = if self.settings.validate {
            let before = Body {
                blocks: method.blocks(),
                exceptions: method.exceptions(),
                end_label: method.end_label(),
            };
            validate(&before, &linearized.body())?
        } else {
            vec![]
        };

        let Linearized {
            blocks,
            exceptions,
            end_label,
            label_generator,
            stats,
        } = linearized;
        method.replace_body(blocks, exceptions, end_label, label_generator)?;

        Ok(MethodOutcome::Changed { stats, mismatches })
    }

    /// Linearize every method of a class, returning the outcome for each
    pub fn run_class(&self, class: &mut Class, report: &mut BatchReport) -> Vec<MethodOutcome> {
        let class_name = class.name.clone();
        class
            .methods
            .iter_mut()
            .map(|method| self.apply(&class_name, method, report))
            .collect()
    }
}

/// First unplaced block which a placed block leads to (following handlers)
///
/// Placed blocks are visited in layout order and their successors by label, so the answer
/// doesn't depend on the order the body came in.
fn next_unplaced(
    graph: &FlowGraph,
    layout: &[SynLabel],
    placed: &HashSet<SynLabel>,
) -> Option<SynLabel> {
    layout.iter().find_map(|label| {
        graph
            .successors(*label, WalkFlags::FOLLOW_HANDLERS)
            .into_iter()
            .find(|target| !placed.contains(target) && graph.block(*target).is_some())
    })
}
