use super::oracle::{EdgeCut, FlowGraph, ReachabilityOracle, WalkFlags};
use super::Settings;
use crate::jvm::code::{BasicBlock, ControlFlow, Instruction, JumpSite, SynLabel};
use log::trace;
use std::collections::{HashMap, HashSet, VecDeque};

/// Edge out of a placed block, which may or may not end up as a fallthrough
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct Edge {
    site: JumpSite,
    target: SynLabel,
    kind: EdgeKind,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum EdgeKind {
    Jump,
    FallThrough,
    Branch,
    SwitchCase,
}

#[derive(Debug)]
struct QueuedEdge {
    edge: Edge,

    /// Was this a candidate pushed back by the loop layout tie-break?
    deferred: bool,
}

/// Orders the blocks reachable from one seed block
///
/// There is at most one pending candidate: the `goto` (or fallthrough) that ends the most recently
/// placed block. Placing its target right after that block would turn the jump into a
/// fallthrough. All other edges (conditional branches and switch targets) go into a FIFO queue and
/// their targets get placed only once no other pending edge can reach them.
///
/// Every reachability question is asked from the seed, with the edges already known to stay
/// explicit cut. Edges that led to a placement are still walked, since they still carry control
/// into the placed block. The intuition is that a target should only be placed through an edge
/// if that edge is the last remaining way into it.
struct Scheduler<'a, 'p> {
    graph: &'p FlowGraph<'a>,
    settings: &'p Settings,
    seed: SynLabel,

    /// Blocks placed so far, across all regions
    placed: &'p mut HashSet<SynLabel>,

    /// Edges which stay explicit jumps, along with blocks placed by earlier regions
    decided: EdgeCut,

    candidate: Option<Edge>,
    queue: VecDeque<QueuedEdge>,

    /// Blocks placed by this region
    order: Vec<SynLabel>,
}

/// Schedule the region of unplaced blocks reachable from `seed`
///
/// Blocks placed before this call are never revisited (walks don't enter them either), and
/// every block this call places is added to `placed`. Returns the blocks in their new order,
/// starting with `seed`.
pub fn schedule_region(
    graph: &FlowGraph,
    seed: SynLabel,
    placed: &mut HashSet<SynLabel>,
    settings: &Settings,
) -> Vec<SynLabel> {
    if placed.contains(&seed) || graph.block(seed).is_none() {
        return vec![];
    }

    let mut decided = EdgeCut::new();
    decided.entering = placed.clone();

    let scheduler = Scheduler {
        graph,
        settings,
        seed,
        placed,
        decided,
        candidate: None,
        queue: VecDeque::new(),
        order: vec![],
    };
    scheduler.run()
}

impl<'a, 'p> Scheduler<'a, 'p> {
    fn run(mut self) -> Vec<SynLabel> {
        self.place(self.seed);

        loop {
            let next = if let Some(candidate) = self.candidate.take() {
                self.consider_candidate(candidate)
            } else if let Some(queued) = self.queue.pop_front() {
                self.consider_queued(queued)
            } else {
                break;
            };

            if let Some(next) = next {
                self.place(next);
            }
        }

        self.order
    }

    /// Append a block to the region and scan its transfers
    fn place(&mut self, label: SynLabel) {
        trace!("placing {:?}", label);
        self.order.push(label);
        self.placed.insert(label);

        let block = match self.graph.block(label) {
            Some(block) => block,
            None => return,
        };
        for (site, flow) in block.transfers() {
            match flow {
                ControlFlow::Plain | ControlFlow::Terminal => (),
                ControlFlow::Branch(target) => self.enqueue(Edge {
                    site,
                    target,
                    kind: EdgeKind::Branch,
                }),
                ControlFlow::Switch { default, cases } => {
                    for target in cases.into_iter().rev().chain(Some(default)) {
                        self.enqueue(Edge {
                            site,
                            target,
                            kind: EdgeKind::SwitchCase,
                        });
                    }
                }
                ControlFlow::Jump(target) => {
                    self.candidate = Some(Edge {
                        site,
                        target,
                        kind: EdgeKind::Jump,
                    });
                }
                ControlFlow::FallThrough(target) => {
                    self.candidate = Some(Edge {
                        site,
                        target,
                        kind: EdgeKind::FallThrough,
                    });
                }
            }
        }
    }

    fn enqueue(&mut self, edge: Edge) {
        self.queue.push_back(QueuedEdge {
            edge,
            deferred: false,
        });
    }

    /// Mark an edge as staying explicit, so that it is cut for all future questions
    fn decide(&mut self, edge: &Edge) {
        cut_edge(&mut self.decided, edge);
    }

    /// Decide what to do with the jump ending the last placed block
    fn consider_candidate(&mut self, edge: Edge) -> Option<SynLabel> {
        if self.placed.contains(&edge.target) {
            trace!("jump {:?} -> {:?} stays (already placed)", edge.site, edge.target);
            self.decide(&edge);
            return None;
        }

        if edge.kind == EdgeKind::FallThrough && self.settings.honour_fallthrough {
            return Some(edge.target);
        }

        let mut cut = self.decided.clone();
        cut_edge(&mut cut, &edge);

        if self
            .graph
            .reaches(self.seed, edge.target, &cut, WalkFlags::empty())
        {
            trace!("jump {:?} -> {:?} stays (reachable elsewhere)", edge.site, edge.target);
            self.decide(&edge);
            return None;
        }

        if self.only_reachable_through_unplaced_handler(edge.target, &cut) {
            trace!("jump {:?} -> {:?} stays (handler region)", edge.site, edge.target);
            self.decide(&edge);
            return None;
        }

        if self.settings.loop_layout_tiebreak && self.should_defer(&edge) {
            trace!("jump {:?} -> {:?} deferred (loop layout)", edge.site, edge.target);
            self.queue.push_back(QueuedEdge {
                edge,
                deferred: true,
            });
            return None;
        }

        Some(edge.target)
    }

    /// Decide what to do with an edge from the queue
    fn consider_queued(&mut self, queued: QueuedEdge) -> Option<SynLabel> {
        let edge = queued.edge;
        if self.placed.contains(&edge.target) {
            self.decide(&edge);
            return None;
        }

        let mut cut = self.decided.clone();
        for other in self.queue.iter().filter(|other| other.deferred) {
            cut_edge(&mut cut, &other.edge);
        }
        cut_edge(&mut cut, &edge);

        if self
            .graph
            .reaches(self.seed, edge.target, &cut, WalkFlags::empty())
        {
            trace!("edge {:?} -> {:?} dropped (reachable elsewhere)", edge.site, edge.target);
            self.decide(&edge);
            None
        } else {
            Some(edge.target)
        }
    }

    /// Can the target only be reached by going through a handler that isn't placed yet?
    fn only_reachable_through_unplaced_handler(&self, target: SynLabel, cut: &EdgeCut) -> bool {
        let from_seed = self
            .graph
            .reachable(self.seed, cut, WalkFlags::FOLLOW_HANDLERS);
        if !from_seed.contains_key(&target) {
            return false;
        }

        self.graph.handler_labels().iter().any(|handler| {
            !self.placed.contains(handler)
                && from_seed.contains_key(handler)
                && self
                    .graph
                    .reaches(*handler, target, cut, WalkFlags::FOLLOW_HANDLERS)
        })
    }

    /// Loop layout tie-break
    ///
    /// Defer the candidate if the block it leaves also has a queued edge into a loop that comes
    /// back to that block, and that loop shares code with the candidate's target.
    fn should_defer(&self, candidate: &Edge) -> bool {
        let last = candidate.site.block;
        let last_block = match self.graph.block(last) {
            Some(block) => block,
            None => return false,
        };

        let mut without_last = self.decided.clone();
        for (site, _) in last_block.transfers() {
            without_last.jumps.insert(site);
        }

        let candidate_region =
            self.graph
                .reachable(candidate.target, &self.decided, WalkFlags::STOP_AT_TERMINAL);

        self.queue
            .iter()
            .filter(|queued| {
                !queued.deferred
                    && queued.edge.site.block == last
                    && !self.placed.contains(&queued.edge.target)
            })
            .any(|queued| {
                let target = queued.edge.target;
                if self
                    .graph
                    .reaches(self.seed, target, &without_last, WalkFlags::empty())
                {
                    return false;
                }
                let region =
                    self.graph
                        .reachable(target, &self.decided, WalkFlags::STOP_AT_TERMINAL);
                region.contains_key(&last)
                    && region.keys().any(|lbl| candidate_region.contains_key(lbl))
            })
    }
}

fn cut_edge(cut: &mut EdgeCut, edge: &Edge) {
    cut.cut(edge.site, edge.target, edge.kind == EdgeKind::SwitchCase);
}

/// Rewrite terminators to match the final block order
///
/// A `goto` to the next block becomes a fallthrough, and a fallthrough to anything other than
/// the next block becomes a `goto`.
pub fn rewrite_terminators(blocks: &mut [BasicBlock]) {
    let next_labels: Vec<Option<SynLabel>> = (0..blocks.len())
        .map(|idx| blocks.get(idx + 1).map(|block| block.label))
        .collect();

    for (block, next) in blocks.iter_mut().zip(next_labels) {
        let terminator = match block.instructions.last_mut() {
            Some(terminator) => terminator,
            None => continue,
        };
        match *terminator {
            Instruction::Goto(target) if Some(target) == next => {
                *terminator = Instruction::FallThrough(target);
            }
            Instruction::FallThrough(target) if Some(target) != next => {
                *terminator = Instruction::Goto(target);
            }
            _ => (),
        }
    }
}

/// Count the jumps eliminated and materialized between two layouts of the same blocks
pub fn count_rewrites(before: &[BasicBlock], after: &[BasicBlock]) -> (usize, usize) {
    let terminators: HashMap<SynLabel, &Instruction> = before
        .iter()
        .filter_map(|block| block.terminator().map(|insn| (block.label, insn)))
        .collect();

    let mut eliminated = 0;
    let mut materialized = 0;
    for block in after {
        match (terminators.get(&block.label).copied(), block.terminator()) {
            (Some(Instruction::Goto(_)), Some(Instruction::FallThrough(_))) => eliminated += 1,
            (Some(Instruction::FallThrough(_)), Some(Instruction::Goto(_))) => materialized += 1,
            _ => (),
        }
    }

    (eliminated, materialized)
}
