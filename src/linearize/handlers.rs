use super::oracle::FlowGraph;
use super::scheduler::schedule_region;
use super::Settings;
use crate::jvm::code::{Instruction, SynLabel};
use log::trace;
use std::collections::HashSet;

/// Schedule the handlers of a region which normal control flow did not reach
///
/// Handlers are visited block by block in the order of `region`, and within a block from the
/// highest priority down, so the order entries are listed in the table plays no part. Each
/// handler still unplaced gets its own region, spliced into `layout` right after the last block
/// it protects. Handler regions can themselves be protected, so this recurses into every region
/// it splices in. Returns the number of handler regions placed.
pub fn place_handlers(
    graph: &FlowGraph,
    region: &[SynLabel],
    layout: &mut Vec<SynLabel>,
    placed: &mut HashSet<SynLabel>,
    settings: &Settings,
) -> usize {
    let mut regions = 0;

    for label in region {
        for handler in graph.handlers_of(*label) {
            if placed.contains(handler) {
                continue;
            }

            let handler_region = schedule_region(graph, *handler, placed, settings);
            if handler_region.is_empty() {
                continue;
            }

            let at = splice_point(graph, *handler, layout);
            trace!("handler region {:?} spliced in at {}", handler_region, at);
            layout.splice(at..at, handler_region.iter().copied());
            regions += 1;
            regions += place_handlers(graph, &handler_region, layout, placed, settings);
        }
    }

    regions
}

/// Position right after the last block protected by `handler`, moved forward so that it doesn't
/// land between a block and the block it continues into
fn splice_point(graph: &FlowGraph, handler: SynLabel, layout: &[SynLabel]) -> usize {
    let mut idx = match layout
        .iter()
        .rposition(|label| graph.handlers_of(*label).contains(&handler))
    {
        Some(idx) => idx,
        None => return layout.len(),
    };

    while idx + 1 < layout.len() && continues_into(graph, layout[idx], layout[idx + 1]) {
        idx += 1;
    }
    idx + 1
}

/// Does `from` end by going to `to` (a jump which becomes a fallthrough once laid out)?
fn continues_into(graph: &FlowGraph, from: SynLabel, to: SynLabel) -> bool {
    match graph.block(from).and_then(|block| block.terminator()) {
        Some(Instruction::Goto(target)) | Some(Instruction::FallThrough(target)) => *target == to,
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{BasicBlock, ExceptionEntry, LabelGenerator, Opcode, SynLabelGenerator};

    fn pop_and_return() -> Vec<Instruction> {
        vec![Instruction::Plain(Opcode::new("pop")), Instruction::Return]
    }

    fn layout_with_handlers(blocks: &[BasicBlock], exceptions: &[ExceptionEntry]) -> Vec<SynLabel> {
        let graph = FlowGraph::new(blocks, exceptions, None).unwrap();
        let settings = Settings::new();
        let mut placed = HashSet::new();
        let region = schedule_region(&graph, blocks[0].label, &mut placed, &settings);
        let mut layout = region.clone();
        place_handlers(&graph, &region, &mut layout, &mut placed, &settings);
        layout
    }

    #[test]
    fn handler_goes_after_protected_run() {
        let mut gen = SynLabelGenerator::new(SynLabel::START);
        let entry = gen.fresh_label();
        let handler = gen.fresh_label();
        let body = gen.fresh_label();
        let exit = gen.fresh_label();

        // handler is first in the original order, but can only be reached via the exception edge
        let blocks = vec![
            BasicBlock::new(
                entry,
                vec![Instruction::Plain(Opcode::new("nop")), Instruction::Goto(body)],
            ),
            BasicBlock::new(handler, pop_and_return()),
            BasicBlock::new(
                body,
                vec![Instruction::Plain(Opcode::new("nop")), Instruction::FallThrough(exit)],
            ),
            BasicBlock::new(exit, vec![Instruction::Return]),
        ];
        let exceptions = vec![ExceptionEntry {
            start: body,
            end: exit,
            handler,
            catch_type: None,
        }];
        let graph = FlowGraph::new(&blocks, &exceptions, None).unwrap();
        let settings = Settings::new();

        let mut placed = HashSet::new();
        let region = schedule_region(&graph, entry, &mut placed, &settings);
        assert_eq!(region, vec![entry, body, exit]);

        let mut layout = region.clone();
        let regions = place_handlers(&graph, &region, &mut layout, &mut placed, &settings);
        assert_eq!(regions, 1);

        // `body` falls through to `exit`, so the handler can't go between them
        assert_eq!(layout, vec![entry, body, exit, handler]);
    }

    #[test]
    fn table_order_does_not_matter() {
        let mut gen = SynLabelGenerator::new(SynLabel::START);
        let entry = gen.fresh_label();
        let body = gen.fresh_label();
        let first = gen.fresh_label();
        let second = gen.fresh_label();

        let blocks = vec![
            BasicBlock::new(
                entry,
                vec![Instruction::Plain(Opcode::new("nop")), Instruction::Goto(body)],
            ),
            BasicBlock::new(
                body,
                vec![Instruction::Plain(Opcode::new("nop")), Instruction::Return],
            ),
            BasicBlock::new(first, pop_and_return()),
            BasicBlock::new(second, pop_and_return()),
        ];
        let guards_entry = ExceptionEntry {
            start: entry,
            end: body,
            handler: first,
            catch_type: None,
        };
        let guards_body = ExceptionEntry {
            start: body,
            end: first,
            handler: second,
            catch_type: None,
        };

        let listed = layout_with_handlers(&blocks, &[guards_entry.clone(), guards_body.clone()]);
        let reversed = layout_with_handlers(&blocks, &[guards_body, guards_entry]);

        // `first` is visited first, but `entry` continues into `body`
        assert_eq!(listed, vec![entry, body, second, first]);
        assert_eq!(listed, reversed);
    }
}
