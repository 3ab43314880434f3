use std::collections::{BTreeSet, HashMap};
use unknot::jvm::code::{
    BasicBlock, BranchCondition, CatchIdentity, ExceptionEntry, Instruction, Opcode,
    OrdComparison, SynLabel,
};
use unknot::jvm::model::{Class, Method};
use unknot::jvm::{BinaryName, Name, UnqualifiedName};
use unknot::linearize::{
    BatchReport, Error, FlowGraph, Linearizer, MethodOutcome, Settings, WalkFlags,
};
use unknot::listing::{parse_class, print_class};

const JUMPS: &str = "
.class demo/Jumps
.method run()V
    goto L2
L1:
    return
L2:
    goto L1
.end method
";

const GUARDED: &str = "
.class demo/Guarded
.method guarded()V
L0:
    invokestatic demo/Util/risky()V
    goto L2
L1:
    pop
    return
L2:
    return
L3:
.catch java/lang/Exception from L0 to L1 using L1
.end method
";

/// Two overlapping catches whose priorities differ between `L3` and `L4`
const FLIPPED: &str = "
.class demo/Flipped
.method flip()V
    goto L4
L1:
    pop
    return
L2:
    pop
    return
L3:
    invokestatic demo/Util/first()V
    return
L4:
    invokestatic demo/Util/second()V
    goto L3
L5:
.catch java/lang/RuntimeException from L3 to L4 using L1
.catch java/lang/Error from L3 to L5 using L2
.catch java/lang/RuntimeException from L4 to L5 using L1
.end method
";

const MIXED: &str = "
.class demo/Mixed
.method mixed(I)I
L0:
    iload_1
    ifeq L5
    goto L3
L1:
    iinc 1 -1
    goto L2
L2:
    iload_1
    ifgt L1
    goto L4
L3:
    iload_1
    tableswitch 0 L2 L4 default L5
L4:
    iconst_1
    ireturn
L5:
    iconst_0
    ireturn
.end method
";

/// Two handlers protecting overlapping ranges, both continuing at the same block
const SHARED: &str = "
.class demo/Shared
.method shared(I)V
L0:
    iload_1
    ifeq L2
    goto L1
L1:
    invokestatic demo/Util/first()V
    goto L5
L2:
    invokestatic demo/Util/second()V
    goto L5
L3:
    pop
    goto L6
L4:
    pop
    goto L6
L5:
    return
L6:
    invokestatic demo/Util/log()V
    return
L7:
.catch java/lang/RuntimeException from L1 to L2 using L3
.catch java/lang/Exception from L1 to L3 using L4
.end method
";

const ALL: [&str; 5] = [JUMPS, GUARDED, FLIPPED, MIXED, SHARED];

fn linearize(source: &str) -> (Class, Vec<MethodOutcome>, BatchReport) {
    let mut class = parse_class(source).unwrap();
    let mut report = BatchReport::default();
    let outcomes = Linearizer::new(Settings::new()).run_class(&mut class, &mut report);
    (class, outcomes, report)
}

fn order(method: &Method) -> Vec<SynLabel> {
    method.blocks().iter().map(|block| block.label).collect()
}

fn coverage_by_label(method: &Method) -> HashMap<SynLabel, Vec<CatchIdentity>> {
    let coverage = method.coverage().unwrap();
    method
        .blocks()
        .iter()
        .enumerate()
        .map(|(position, block)| (block.label, coverage.at(position).to_vec()))
        .collect()
}

fn successors_by_label(method: &Method) -> HashMap<SynLabel, BTreeSet<SynLabel>> {
    method
        .blocks()
        .iter()
        .map(|block| (block.label, block.successors().into_iter().collect()))
        .collect()
}

/// Every fallthrough must land on the block right after it
fn assert_fallthroughs_are_adjacent(method: &Method) {
    let blocks = method.blocks();
    for (idx, block) in blocks.iter().enumerate() {
        if let Some(Instruction::FallThrough(target)) = block.terminator() {
            assert_eq!(
                blocks.get(idx + 1).map(|next| next.label),
                Some(*target),
                "{:?} falls through to a block that isn't next",
                block.label
            );
        }
    }
}

/// Instructions of every block, with fallthroughs written out as jumps
fn bodies_by_label(method: &Method) -> HashMap<SynLabel, Vec<Instruction>> {
    method
        .blocks()
        .iter()
        .map(|block| {
            let instructions = block
                .instructions
                .iter()
                .map(|insn| match insn {
                    Instruction::FallThrough(target) => Instruction::Goto(*target),
                    other => other.clone(),
                })
                .collect();
            (block.label, instructions)
        })
        .collect()
}

/// Every path from the entry of at most `length` blocks, following exception edges too
fn bounded_paths(method: &Method, length: usize) -> BTreeSet<Vec<SynLabel>> {
    let graph = FlowGraph::for_method(method).unwrap();
    let mut paths = BTreeSet::new();
    let mut to_extend = vec![vec![method.entry().label]];

    while let Some(path) = to_extend.pop() {
        if path.len() < length {
            let last = path[path.len() - 1];
            for next in graph.successors(last, WalkFlags::FOLLOW_HANDLERS) {
                let mut longer = path.clone();
                longer.push(next);
                to_extend.push(longer);
            }
        }
        paths.insert(path);
    }

    paths
}

/// Each rebuilt range must only span blocks its identity covered before, and stop exactly
/// where that coverage stops (or where another range of the same identity picks up)
fn assert_spans_match_coverage(original: &Method, method: &Method) {
    let covered = coverage_by_label(original);
    let order = order(method);
    let starts: BTreeSet<(usize, CatchIdentity)> = method
        .exceptions()
        .iter()
        .filter_map(|entry| {
            let start = order.iter().position(|label| *label == entry.start)?;
            Some((start, entry.identity()))
        })
        .collect();

    for entry in method.exceptions() {
        let identity = entry.identity();
        let start = order
            .iter()
            .position(|label| *label == entry.start)
            .expect("range starts on a block");
        let end = match order.iter().position(|label| *label == entry.end) {
            Some(end) => end,
            None => {
                assert_eq!(Some(entry.end), method.end_label());
                order.len()
            }
        };
        assert!(start < end, "{:?} is empty", entry);

        for label in &order[start..end] {
            assert!(covered[label].contains(&identity), "{:?} spans {:?}", entry, label);
        }
        if start > 0 && covered[&order[start - 1]].contains(&identity) {
            let ends_here = method
                .exceptions()
                .iter()
                .any(|other| other.identity() == identity && other.end == entry.start);
            assert!(ends_here, "{:?} starts in the middle of its coverage", entry);
        }
        if end < order.len() && covered[&order[end]].contains(&identity) {
            assert!(
                starts.contains(&(end, identity.clone())),
                "{:?} ends in the middle of its coverage",
                entry
            );
        }
    }
}

fn assert_changed_cleanly(outcome: &MethodOutcome) {
    match outcome {
        MethodOutcome::Changed { mismatches, .. } => {
            assert!(mismatches.is_empty(), "{:?}", mismatches)
        }
        other => panic!("expected a changed method, got {:?}", other),
    }
}

#[test]
fn jumps_become_fallthroughs() {
    let (class, outcomes, report) = linearize(JUMPS);
    assert_changed_cleanly(&outcomes[0]);

    let method = &class.methods[0];
    let entry = method.entry().label;
    assert_eq!(
        order(method),
        vec![entry, SynLabel::from_index(2), SynLabel::from_index(1)]
    );
    assert_eq!(method.goto_count(), 0);
    assert_eq!(report.jumps_eliminated, 2);
    assert_eq!(report.jumps_materialized, 0);
    assert_fallthroughs_are_adjacent(method);

    assert_eq!(
        print_class(&class),
        "\
.class demo/Jumps

.method run()V
L3:
L2:
L1:
    return
.end method
"
    );
}

#[test]
fn handler_follows_the_code_it_protects() {
    let (class, outcomes, report) = linearize(GUARDED);
    assert_changed_cleanly(&outcomes[0]);
    if let MethodOutcome::Changed { stats, .. } = &outcomes[0] {
        assert_eq!(stats.handler_regions, 1);
    }

    let method = &class.methods[0];
    let (l0, l1, l2) = (
        SynLabel::from_index(0),
        SynLabel::from_index(1),
        SynLabel::from_index(2),
    );
    assert_eq!(order(method), vec![l0, l2, l1]);
    assert_eq!(report.jumps_eliminated, 1);

    let exceptions = method.exceptions();
    assert_eq!(exceptions.len(), 1);
    assert_eq!(exceptions[0].start, l0);
    assert_eq!(exceptions[0].end, l2);
    assert_eq!(exceptions[0].handler, l1);
}

#[test]
fn priority_flip_splits_a_chain() {
    let original = parse_class(FLIPPED).unwrap();
    let (class, outcomes, report) = linearize(FLIPPED);
    assert_changed_cleanly(&outcomes[0]);
    assert_eq!(report.chains_split, 1);

    let method = &class.methods[0];
    let entry = method.entry().label;
    assert_eq!(
        &order(method)[..3],
        &[entry, SynLabel::from_index(4), SynLabel::from_index(3)]
    );

    // Same handlers in the same priority order, block for block
    assert_eq!(
        coverage_by_label(&original.methods[0]),
        coverage_by_label(method)
    );
    assert_eq!(method.exceptions().len(), 3);
}

#[test]
fn exception_coverage_is_preserved() {
    for source in [GUARDED, FLIPPED, SHARED] {
        let original = parse_class(source).unwrap();
        let (class, _, report) = linearize(source);
        assert_eq!(report.methods_failed, 0);
        for (before, after) in original.methods.iter().zip(&class.methods) {
            assert_eq!(coverage_by_label(before), coverage_by_label(after));
        }
    }
}

#[test]
fn control_flow_is_preserved() {
    let original = parse_class(MIXED).unwrap();
    let (class, outcomes, report) = linearize(MIXED);
    assert_eq!(report.methods_failed, 0);
    assert!(!matches!(outcomes[0], MethodOutcome::Failed(_)));

    let before = &original.methods[0];
    let after = &class.methods[0];

    // Every block is emitted exactly once
    let mut before_labels = order(before);
    let mut after_labels = order(after);
    before_labels.sort();
    after_labels.sort();
    assert_eq!(before_labels, after_labels);

    // and goes to the same places as before
    assert_eq!(successors_by_label(before), successors_by_label(after));
    assert_eq!(after.entry().label, before.entry().label);
    assert_fallthroughs_are_adjacent(after);
    assert!(after.goto_count() < before.goto_count());
}

#[test]
fn second_run_has_nothing_to_do() {
    for source in ALL {
        let (mut class, _, _) = linearize(source);
        let before = class.clone();

        let mut report = BatchReport::default();
        let outcomes = Linearizer::new(Settings::new()).run_class(&mut class, &mut report);
        assert_eq!(report.jumps_eliminated, 0);
        assert_eq!(report.chains_split, 0);
        assert!(outcomes
            .iter()
            .all(|outcome| matches!(outcome, MethodOutcome::Unchanged)));

        for (method, again) in before.methods.iter().zip(&class.methods) {
            assert_eq!(method.blocks(), again.blocks());
            assert_eq!(method.exceptions(), again.exceptions());
        }
    }
}

#[test]
fn paths_through_the_output_match_the_input() {
    for source in ALL {
        let original = parse_class(source).unwrap();
        let (class, _, report) = linearize(source);
        assert_eq!(report.methods_failed, 0);

        for (before, after) in original.methods.iter().zip(&class.methods) {
            assert_eq!(bodies_by_label(before), bodies_by_label(after));
            assert_eq!(bounded_paths(before, 6), bounded_paths(after, 6));
        }
    }
}

#[test]
fn spans_end_where_coverage_does() {
    for source in ALL {
        let original = parse_class(source).unwrap();
        let (class, _, _) = linearize(source);
        for (before, after) in original.methods.iter().zip(&class.methods) {
            assert_spans_match_coverage(before, after);
        }
    }
}

#[test]
fn shared_handler_target_follows_one_handler() {
    let (class, outcomes, _) = linearize(SHARED);
    assert_changed_cleanly(&outcomes[0]);
    if let MethodOutcome::Changed { stats, .. } = &outcomes[0] {
        assert_eq!(stats.handler_regions, 2);
    }

    // `L6` can only follow one of the two handlers, the other keeps its `goto`
    let method = &class.methods[0];
    let handler_gotos = [SynLabel::from_index(3), SynLabel::from_index(4)]
        .iter()
        .filter(|label| {
            let idx = method.block_index(**label).unwrap();
            matches!(method.blocks()[idx].terminator(), Some(Instruction::Goto(_)))
        })
        .count();
    assert_eq!(handler_gotos, 1);
    assert_fallthroughs_are_adjacent(method);
}

#[test]
fn printed_output_parses_back() {
    for source in ALL {
        let (class, _, _) = linearize(source);
        let printed = print_class(&class);
        let reparsed = parse_class(&printed).unwrap();

        assert_eq!(print_class(&reparsed), printed);
        for (method, reparsed) in class.methods.iter().zip(&reparsed.methods) {
            assert_eq!(method.blocks(), reparsed.blocks());
            assert_eq!(method.exceptions(), reparsed.exceptions());
        }
    }
}

#[test]
fn failures_stay_with_their_method() {
    let source = "
.class demo/Partial
.method dead()V
L0:
    return
L1:
    goto L0
.end method
.method run()V
    goto L2
L1:
    return
L2:
    goto L1
.end method
";
    let original = parse_class(source).unwrap();
    let (class, outcomes, report) = linearize(source);

    assert!(matches!(
        outcomes[0],
        MethodOutcome::Failed(Error::UnscheduledBlock(label)) if label == SynLabel::from_index(1)
    ));
    assert_eq!(class.methods[0].blocks(), original.methods[0].blocks());
    assert_changed_cleanly(&outcomes[1]);

    assert_eq!(report.methods_seen, 2);
    assert_eq!(report.methods_failed, 1);
    assert_eq!(report.methods_touched, 1);
    assert_eq!(report.jumps_eliminated, 2);
}

/// Small deterministic generator, enough to vary the shape of generated methods
struct Lcg(u64);

impl Lcg {
    fn below(&mut self, bound: usize) -> usize {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 33) as usize % bound
    }
}

/// Method of up to eight blocks, all reachable from the entry, with up to two catches
fn generated_method(rng: &mut Lcg) -> Method {
    let count = 2 + rng.below(7);
    let labels: Vec<SynLabel> = (0..count).map(SynLabel::from_index).collect();

    // Every block after the entry is the target of some earlier block
    let mut children: Vec<Vec<SynLabel>> = vec![vec![]; count];
    for idx in 1..count {
        children[rng.below(idx)].push(labels[idx]);
    }

    let mut blocks = vec![];
    for (idx, label) in labels.iter().enumerate() {
        let mut instructions = vec![Instruction::Plain(Opcode::new("iload_1"))];
        let anywhere = labels[rng.below(count)];
        let roll = rng.below(6);
        match children[idx].as_slice() {
            [] if roll < 2 => instructions.push(Instruction::Goto(anywhere)),
            [] if roll < 3 => instructions.push(Instruction::AThrow),
            [] => instructions.push(Instruction::Return),
            [only] => {
                if roll % 2 == 0 {
                    let condition = BranchCondition::If(OrdComparison::EQ);
                    instructions.push(Instruction::If(condition, anywhere));
                }
                if labels.get(idx + 1) == Some(only) && roll < 3 {
                    instructions.push(Instruction::FallThrough(*only));
                } else {
                    instructions.push(Instruction::Goto(*only));
                }
            }
            [first, rest @ ..] => instructions.push(Instruction::TableSwitch {
                default: *first,
                low: 0,
                targets: rest.iter().copied().chain(Some(anywhere)).collect(),
            }),
        }
        blocks.push(BasicBlock::new(*label, instructions));
    }

    let mut exceptions = vec![];
    let mut end_label = None;
    for _ in 0..rng.below(3) {
        let start = rng.below(count);
        let end = start + 1 + rng.below(count - start);
        let end = match labels.get(end) {
            Some(end) => *end,
            None => *end_label.get_or_insert(SynLabel::from_index(count)),
        };
        let catch_type = match rng.below(2) {
            0 => None,
            _ => Some(BinaryName::EXCEPTION),
        };
        exceptions.push(ExceptionEntry {
            start: labels[start],
            end,
            handler: labels[rng.below(count)],
            catch_type,
        });
    }

    let name = UnqualifiedName::from_string(String::from("generated")).unwrap();
    Method::new(name, "(I)V", blocks, exceptions, end_label).unwrap()
}

#[test]
fn generated_methods_settle() {
    let class = BinaryName::from_string(String::from("demo/Generated")).unwrap();
    let linearizer = Linearizer::new(Settings::new());
    let mut rng = Lcg(2634);
    let mut report = BatchReport::default();

    for _ in 0..400 {
        let original = generated_method(&mut rng);
        let mut method = original.clone();

        match linearizer.apply(&class, &mut method, &mut report) {
            MethodOutcome::Failed(err) => panic!("{}: {}", print_method(&original), err),
            MethodOutcome::Changed { mismatches, .. } => {
                assert!(mismatches.is_empty(), "{:?}", mismatches)
            }
            MethodOutcome::Unchanged => (),
        }
        assert_eq!(coverage_by_label(&original), coverage_by_label(&method));
        assert_eq!(bodies_by_label(&original), bodies_by_label(&method));
        assert_eq!(bounded_paths(&original, 4), bounded_paths(&method, 4));
        assert_fallthroughs_are_adjacent(&method);
        assert_spans_match_coverage(&original, &method);

        let settled = method.clone();
        let again = linearizer.apply(&class, &mut method, &mut report);
        assert!(
            matches!(again, MethodOutcome::Unchanged),
            "{}: {:?}",
            print_method(&original),
            again
        );
        assert_eq!(method.blocks(), settled.blocks());
        assert_eq!(method.exceptions(), settled.exceptions());
    }

    assert_eq!(report.methods_seen, 800);
    assert_eq!(report.methods_failed, 0);
}

/// Listing of a single method, for failure messages
fn print_method(method: &Method) -> String {
    let class = Class {
        name: BinaryName::from_string(String::from("demo/Generated")).unwrap(),
        methods: vec![method.clone()],
    };
    print_class(&class)
}
