use crate::jvm::code::{
    BasicBlock, ControlFlow, ExceptionEntry, HandlerCoverage, JumpSite, SynLabel,
};
use crate::jvm::model::Method;
use crate::jvm::Error;
use bitflags::bitflags;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

bitflags! {
    /// Options controlling how a reachability walk proceeds
    pub struct WalkFlags: u8 {
        /// Don't leave blocks which end in a return or `athrow` (not even along exception edges)
        const STOP_AT_TERMINAL = 0b0000_0001;

        /// Follow the edges from a block to the handlers of every entry covering it
        const FOLLOW_HANDLERS = 0b0000_0010;
    }
}

/// Set of edges which a reachability walk should treat as absent
#[derive(Clone, Debug, Default)]
pub struct EdgeCut {
    /// Transfers cut entirely (for a switch, this cuts every case and the default)
    pub jumps: HashSet<JumpSite>,

    /// Individual switch targets cut
    pub switch_cases: HashMap<JumpSite, HashSet<SynLabel>>,

    /// Exception edges cut, as `(protected block, handler)`
    pub handlers: HashSet<(SynLabel, SynLabel)>,

    /// Blocks which can't be entered at all (except when they are where the walk starts)
    pub entering: HashSet<SynLabel>,
}

impl EdgeCut {
    pub fn new() -> EdgeCut {
        EdgeCut::default()
    }

    /// Cut the edge leaving `site` for `target`
    ///
    /// Switches can jump to the same target more than once, in which case all of those edges
    /// get cut.
    pub fn cut(&mut self, site: JumpSite, target: SynLabel, is_switch: bool) {
        if is_switch {
            self.switch_cases.entry(site).or_default().insert(target);
        } else {
            self.jumps.insert(site);
        }
    }

    /// Is the edge from `site` to `target` cut?
    pub fn is_cut(&self, site: JumpSite, target: SynLabel) -> bool {
        self.entering.contains(&target)
            || self.jumps.contains(&site)
            || self
                .switch_cases
                .get(&site)
                .map_or(false, |cases| cases.contains(&target))
    }

    /// Is the exception edge from `block` to `handler` cut?
    pub fn is_handler_cut(&self, block: SynLabel, handler: SynLabel) -> bool {
        self.entering.contains(&handler) || self.handlers.contains(&(block, handler))
    }
}

/// Capability for answering forward reachability questions
///
/// Implementations must be pure: the same query always gets the same answer.
pub trait ReachabilityOracle {
    /// Walk forward from `from`, returning every block reached along with the number of
    /// instructions executed in it
    fn reachable(
        &self,
        from: SynLabel,
        cut: &EdgeCut,
        flags: WalkFlags,
    ) -> BTreeMap<SynLabel, usize>;

    /// Is `to` reachable from `from`?
    fn reaches(&self, from: SynLabel, to: SynLabel, cut: &EdgeCut, flags: WalkFlags) -> bool {
        self.reachable(from, cut, flags).contains_key(&to)
    }
}

/// Control flow graph of a sequence of blocks along with their exception table
///
/// Exception edges are computed from the block order the graph was built with, so that the same
/// structure describes both an input method and the linearized output.
#[derive(Debug)]
pub struct FlowGraph<'a> {
    blocks: HashMap<SynLabel, &'a BasicBlock>,

    /// Distinct handlers covering each block, highest priority first
    handlers: HashMap<SynLabel, Vec<SynLabel>>,

    /// Every handler in the table, in table order
    handler_labels: Vec<SynLabel>,
}

impl<'a> FlowGraph<'a> {
    pub fn new(
        blocks: &'a [BasicBlock],
        exceptions: &[ExceptionEntry],
        end_label: Option<SynLabel>,
    ) -> Result<FlowGraph<'a>, Error> {
        let coverage = HandlerCoverage::new(blocks, exceptions, end_label)?;
        let mut handlers = HashMap::new();
        for (position, block) in blocks.iter().enumerate() {
            let mut block_handlers: Vec<SynLabel> = vec![];
            for identity in coverage.at(position) {
                if !block_handlers.contains(&identity.handler) {
                    block_handlers.push(identity.handler);
                }
            }
            handlers.insert(block.label, block_handlers);
        }

        let mut handler_labels: Vec<SynLabel> = vec![];
        for entry in exceptions {
            if !handler_labels.contains(&entry.handler) {
                handler_labels.push(entry.handler);
            }
        }

        Ok(FlowGraph {
            blocks: blocks.iter().map(|block| (block.label, block)).collect(),
            handlers,
            handler_labels,
        })
    }

    pub fn for_method(method: &'a Method) -> Result<FlowGraph<'a>, Error> {
        FlowGraph::new(method.blocks(), method.exceptions(), method.end_label())
    }

    pub fn block(&self, label: SynLabel) -> Option<&'a BasicBlock> {
        self.blocks.get(&label).copied()
    }

    /// Handlers of entries covering a block, highest priority first
    pub fn handlers_of(&self, label: SynLabel) -> &[SynLabel] {
        self.handlers.get(&label).map_or(&[][..], Vec::as_slice)
    }

    /// All handlers in the exception table
    pub fn handler_labels(&self) -> &[SynLabel] {
        &self.handler_labels
    }

    /// Labels a block can continue to
    pub fn successors(&self, label: SynLabel, flags: WalkFlags) -> BTreeSet<SynLabel> {
        self.edges(label, &EdgeCut::default(), flags)
            .into_iter()
            .collect()
    }

    /// Outgoing edges of a block which aren't cut
    fn edges(&self, label: SynLabel, cut: &EdgeCut, flags: WalkFlags) -> Vec<SynLabel> {
        let block = match self.blocks.get(&label) {
            Some(block) => block,
            None => return vec![],
        };
        if flags.contains(WalkFlags::STOP_AT_TERMINAL) && block.ends_in_terminal() {
            return vec![];
        }

        let mut targets = vec![];
        for (site, flow) in block.transfers() {
            match flow {
                ControlFlow::Plain | ControlFlow::Terminal => (),
                ControlFlow::Jump(target)
                | ControlFlow::FallThrough(target)
                | ControlFlow::Branch(target) => {
                    if !cut.is_cut(site, target) {
                        targets.push(target);
                    }
                }
                ControlFlow::Switch { default, cases } => {
                    for target in cases.into_iter().chain(Some(default)) {
                        if !cut.is_cut(site, target) {
                            targets.push(target);
                        }
                    }
                }
            }
        }

        if flags.contains(WalkFlags::FOLLOW_HANDLERS) {
            for handler in self.handlers_of(label) {
                if !cut.is_handler_cut(label, *handler) {
                    targets.push(*handler);
                }
            }
        }

        targets
    }
}

impl<'a> ReachabilityOracle for FlowGraph<'a> {
    fn reachable(
        &self,
        from: SynLabel,
        cut: &EdgeCut,
        flags: WalkFlags,
    ) -> BTreeMap<SynLabel, usize> {
        let mut reached: BTreeMap<SynLabel, usize> = BTreeMap::new();
        let mut to_visit: Vec<SynLabel> = vec![from];

        while let Some(label) = to_visit.pop() {
            let block = match self.blocks.get(&label) {
                Some(block) => block,
                None => continue,
            };
            if reached.contains_key(&label) {
                continue;
            }
            reached.insert(label, block.instructions.len());
            for target in self.edges(label, cut, flags) {
                if !reached.contains_key(&target) {
                    to_visit.push(target);
                }
            }
        }

        reached
    }
}
