use super::{ControlFlow, Instruction, SynLabel};

/// A labelled run of instructions which always ends in an unconditional transfer
///
/// Conditional branches may appear anywhere in the block (their alternative is the next
/// instruction), but `goto`, switches, returns, `athrow`, and the synthetic fallthrough marker
/// only ever appear as the final instruction.
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct BasicBlock {
    /// Label at the start of the block
    pub label: SynLabel,

    /// Instructions in the block
    pub instructions: Vec<Instruction>,
}

/// Location of a control transfer: the block holding it, and its index in that block
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct JumpSite {
    pub block: SynLabel,
    pub index: usize,
}

impl BasicBlock {
    pub fn new(label: SynLabel, instructions: Vec<Instruction>) -> BasicBlock {
        BasicBlock {
            label,
            instructions,
        }
    }

    /// Final instruction of the block
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last()
    }

    /// Does the block end in a return or `athrow`?
    pub fn ends_in_terminal(&self) -> bool {
        matches!(
            self.terminator().map(Instruction::control_flow),
            Some(ControlFlow::Terminal)
        )
    }

    /// Every instruction in the block that transfers control, in order
    pub fn transfers(&self) -> impl Iterator<Item = (JumpSite, ControlFlow)> + '_ {
        let block = self.label;
        self.instructions
            .iter()
            .enumerate()
            .filter_map(move |(index, insn)| match insn.control_flow() {
                ControlFlow::Plain => None,
                flow => Some((JumpSite { block, index }, flow)),
            })
    }

    /// All labels this block can continue at (not including exception handlers)
    pub fn successors(&self) -> Vec<SynLabel> {
        let mut successors = vec![];
        for (_, flow) in self.transfers() {
            match flow {
                ControlFlow::Plain | ControlFlow::Terminal => (),
                ControlFlow::Jump(lbl)
                | ControlFlow::FallThrough(lbl)
                | ControlFlow::Branch(lbl) => successors.push(lbl),
                ControlFlow::Switch { default, cases } => {
                    successors.extend(cases);
                    successors.push(default);
                }
            }
        }
        successors
    }
}
