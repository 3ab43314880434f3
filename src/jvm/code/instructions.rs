use super::SynLabel;
use std::fmt;
use std::ops::Not;

/// Straight-line instruction whose meaning is irrelevant to control flow
///
/// These are carried through verbatim: the mnemonic along with whatever operands were written
/// after it.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Opcode {
    pub mnemonic: String,
    pub operands: Vec<String>,
}

impl Opcode {
    pub fn new(mnemonic: impl Into<String>) -> Opcode {
        Opcode {
            mnemonic: mnemonic.into(),
            operands: vec![],
        }
    }

    pub fn with_operands(mnemonic: impl Into<String>, operands: Vec<String>) -> Opcode {
        Opcode {
            mnemonic: mnemonic.into(),
            operands,
        }
    }
}

/// JVM bytecode instruction, as seen by control flow analysis
///
/// This is a closed set: the class file format fixes which instructions can transfer control, so
/// analyses can match exhaustively on it.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum Instruction {
    /// Anything that just continues to the next instruction
    Plain(Opcode),

    /// Conditional branch (the alternative is the next instruction)
    If(BranchCondition, SynLabel),

    /// Unconditional jump (covers `goto` and `goto_w`)
    Goto(SynLabel),

    TableSwitch {
        /// Jump target if the argument is less than `low` or greater than
        /// `low + targets.len()`
        default: SynLabel,

        /// Value associated with the first jump target
        low: i32,

        /// Jump targets
        targets: Vec<SynLabel>,
    },

    LookupSwitch {
        /// Jump target if there is no corresponding key
        default: SynLabel,

        /// Jump targets (sorted so that the keys are ascending)
        targets: Vec<(i32, SynLabel)>,
    },

    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    AThrow,

    /// This is a synthetic marker used to explicitly end a block which just falls through to the
    /// next block. In the JVM, this is implicit when a block ends without a jump. Making it
    /// explicit allows us to enforce that all blocks end in a control transfer.
    FallThrough(SynLabel),
}

/// How an instruction affects control flow
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ControlFlow {
    /// Continues with the next instruction
    Plain,

    /// Always continues at the target
    Jump(SynLabel),

    /// Continues at the target, which must be the next block in the layout
    FallThrough(SynLabel),

    /// Continues at the target or with the next instruction
    Branch(SynLabel),

    /// Continues at one of the case targets or at the default
    Switch {
        default: SynLabel,
        cases: Vec<SynLabel>,
    },

    /// Leaves the method
    Terminal,
}

impl Instruction {
    /// Classify the instruction for the purpose of control flow
    pub fn control_flow(&self) -> ControlFlow {
        match self {
            Instruction::Plain(_) => ControlFlow::Plain,
            Instruction::If(_, lbl) => ControlFlow::Branch(*lbl),
            Instruction::Goto(lbl) => ControlFlow::Jump(*lbl),
            Instruction::FallThrough(lbl) => ControlFlow::FallThrough(*lbl),
            Instruction::TableSwitch {
                default, targets, ..
            } => ControlFlow::Switch {
                default: *default,
                cases: targets.clone(),
            },
            Instruction::LookupSwitch { default, targets } => ControlFlow::Switch {
                default: *default,
                cases: targets.iter().map(|(_, lbl)| *lbl).collect(),
            },
            Instruction::IReturn
            | Instruction::LReturn
            | Instruction::FReturn
            | Instruction::DReturn
            | Instruction::AReturn
            | Instruction::Return
            | Instruction::AThrow => ControlFlow::Terminal,
        }
    }

    /// Does control never reach the instruction after this one?
    pub fn is_unconditional(&self) -> bool {
        match self {
            Instruction::Plain(_) | Instruction::If(_, _) => false,
            Instruction::Goto(_)
            | Instruction::FallThrough(_)
            | Instruction::TableSwitch { .. }
            | Instruction::LookupSwitch { .. }
            | Instruction::IReturn
            | Instruction::LReturn
            | Instruction::FReturn
            | Instruction::DReturn
            | Instruction::AReturn
            | Instruction::Return
            | Instruction::AThrow => true,
        }
    }

    /// Explicit jump targets (this excludes the synthetic fallthrough)
    pub fn jump_targets(&self) -> JumpTargets {
        match self {
            Instruction::If(_, lbl) | Instruction::Goto(lbl) => JumpTargets::Regular(*lbl),
            Instruction::TableSwitch {
                default, targets, ..
            } => {
                let mut ts = vec![*default];
                ts.extend(targets.iter().copied());
                JumpTargets::Many(ts)
            }
            Instruction::LookupSwitch { default, targets } => {
                let mut ts = vec![*default];
                ts.extend(targets.iter().map(|(_, target)| *target));
                JumpTargets::Many(ts)
            }
            Instruction::Plain(_)
            | Instruction::FallThrough(_)
            | Instruction::IReturn
            | Instruction::LReturn
            | Instruction::FReturn
            | Instruction::DReturn
            | Instruction::AReturn
            | Instruction::Return
            | Instruction::AThrow => JumpTargets::None,
        }
    }

    /// Mnemonic for terminal instructions
    pub fn terminal_mnemonic(&self) -> Option<&'static str> {
        match self {
            Instruction::IReturn => Some("ireturn"),
            Instruction::LReturn => Some("lreturn"),
            Instruction::FReturn => Some("freturn"),
            Instruction::DReturn => Some("dreturn"),
            Instruction::AReturn => Some("areturn"),
            Instruction::Return => Some("return"),
            Instruction::AThrow => Some("athrow"),
            _ => None,
        }
    }

    /// Parse a terminal instruction from its mnemonic
    pub fn terminal_from_mnemonic(mnemonic: &str) -> Option<Instruction> {
        match mnemonic {
            "ireturn" => Some(Instruction::IReturn),
            "lreturn" => Some(Instruction::LReturn),
            "freturn" => Some(Instruction::FReturn),
            "dreturn" => Some(Instruction::DReturn),
            "areturn" => Some(Instruction::AReturn),
            "return" => Some(Instruction::Return),
            "athrow" => Some(Instruction::AThrow),
            _ => None,
        }
    }
}

/// Renders in listing syntax
///
/// The synthetic fallthrough is rendered as a comment, since it has no encoding.
impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Plain(Opcode { mnemonic, operands }) => {
                f.write_str(mnemonic)?;
                for operand in operands {
                    write!(f, " {}", operand)?;
                }
                Ok(())
            }
            Instruction::If(cond, lbl) => write!(f, "{} {}", cond.mnemonic(), lbl),
            Instruction::Goto(lbl) => write!(f, "goto {}", lbl),
            Instruction::TableSwitch {
                default,
                low,
                targets,
            } => {
                write!(f, "tableswitch {}", low)?;
                for target in targets {
                    write!(f, " {}", target)?;
                }
                write!(f, " default {}", default)
            }
            Instruction::LookupSwitch { default, targets } => {
                f.write_str("lookupswitch")?;
                for (key, target) in targets {
                    write!(f, " {}:{}", key, target)?;
                }
                write!(f, " default {}", default)
            }
            Instruction::FallThrough(lbl) => write!(f, "; falls through to {}", lbl),
            terminal => f.write_str(terminal.terminal_mnemonic().unwrap_or("?")),
        }
    }
}

/// Non-fallthrough jump targets of an [`Instruction`]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum JumpTargets {
    None,
    Regular(SynLabel),
    Many(Vec<SynLabel>),
}

impl JumpTargets {
    pub fn targets(&self) -> &[SynLabel] {
        match self {
            JumpTargets::None => &[],
            JumpTargets::Regular(a) => std::slice::from_ref(a),
            JumpTargets::Many(a_many) => a_many,
        }
    }
}

/// Condition tested by a conditional branch
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum BranchCondition {
    If(OrdComparison),     // covers `ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`
    IfICmp(OrdComparison), // covers `if_icmpeq`, `if_icmpne`, `if_icmplt`, ... `if_icmple`
    IfACmp(EqComparison),  // covers `if_acmpeq`, `if_acmpne`
    IfNull(EqComparison),  // covers `ifnull`, `ifnonnull`
}

impl BranchCondition {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            BranchCondition::If(comp) => match comp {
                OrdComparison::EQ => "ifeq",
                OrdComparison::NE => "ifne",
                OrdComparison::LT => "iflt",
                OrdComparison::GE => "ifge",
                OrdComparison::GT => "ifgt",
                OrdComparison::LE => "ifle",
            },
            BranchCondition::IfICmp(comp) => match comp {
                OrdComparison::EQ => "if_icmpeq",
                OrdComparison::NE => "if_icmpne",
                OrdComparison::LT => "if_icmplt",
                OrdComparison::GE => "if_icmpge",
                OrdComparison::GT => "if_icmpgt",
                OrdComparison::LE => "if_icmple",
            },
            BranchCondition::IfACmp(comp) => match comp {
                EqComparison::EQ => "if_acmpeq",
                EqComparison::NE => "if_acmpne",
            },
            BranchCondition::IfNull(comp) => match comp {
                EqComparison::EQ => "ifnull",
                EqComparison::NE => "ifnonnull",
            },
        }
    }

    pub fn from_mnemonic(mnemonic: &str) -> Option<BranchCondition> {
        let cond = match mnemonic {
            "ifeq" => BranchCondition::If(OrdComparison::EQ),
            "ifne" => BranchCondition::If(OrdComparison::NE),
            "iflt" => BranchCondition::If(OrdComparison::LT),
            "ifge" => BranchCondition::If(OrdComparison::GE),
            "ifgt" => BranchCondition::If(OrdComparison::GT),
            "ifle" => BranchCondition::If(OrdComparison::LE),
            "if_icmpeq" => BranchCondition::IfICmp(OrdComparison::EQ),
            "if_icmpne" => BranchCondition::IfICmp(OrdComparison::NE),
            "if_icmplt" => BranchCondition::IfICmp(OrdComparison::LT),
            "if_icmpge" => BranchCondition::IfICmp(OrdComparison::GE),
            "if_icmpgt" => BranchCondition::IfICmp(OrdComparison::GT),
            "if_icmple" => BranchCondition::IfICmp(OrdComparison::LE),
            "if_acmpeq" => BranchCondition::IfACmp(EqComparison::EQ),
            "if_acmpne" => BranchCondition::IfACmp(EqComparison::NE),
            "ifnull" => BranchCondition::IfNull(EqComparison::EQ),
            "ifnonnull" => BranchCondition::IfNull(EqComparison::NE),
            _ => return None,
        };
        Some(cond)
    }
}

impl Not for BranchCondition {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            BranchCondition::If(comp) => BranchCondition::If(!comp),
            BranchCondition::IfICmp(comp) => BranchCondition::IfICmp(!comp),
            BranchCondition::IfACmp(comp) => BranchCondition::IfACmp(!comp),
            BranchCondition::IfNull(comp) => BranchCondition::IfNull(!comp),
        }
    }
}

/// Binary comparison operators available for `int` branches
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}

impl Not for OrdComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            OrdComparison::EQ => OrdComparison::NE,
            OrdComparison::GE => OrdComparison::LT,
            OrdComparison::GT => OrdComparison::LE,
            OrdComparison::LE => OrdComparison::GT,
            OrdComparison::LT => OrdComparison::GE,
            OrdComparison::NE => OrdComparison::EQ,
        }
    }
}

/// Equality/inequality comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

impl Not for EqComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            EqComparison::EQ => EqComparison::NE,
            EqComparison::NE => EqComparison::EQ,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{LabelGenerator, SynLabelGenerator};

    #[test]
    fn branch_mnemonics_round_trip() {
        for mnemonic in ["ifeq", "if_icmpge", "if_acmpne", "ifnonnull"] {
            let cond = BranchCondition::from_mnemonic(mnemonic).unwrap();
            assert_eq!(cond.mnemonic(), mnemonic);
        }
        assert_eq!(BranchCondition::from_mnemonic("goto"), None);
    }

    #[test]
    fn negated_conditions() {
        let cond = BranchCondition::from_mnemonic("if_icmplt").unwrap();
        assert_eq!((!cond).mnemonic(), "if_icmpge");
        assert_eq!(!!cond, cond);
    }

    #[test]
    fn classification() {
        let gen = &mut SynLabelGenerator::new(SynLabel::START);
        let l0 = gen.fresh_label();
        let l1 = gen.fresh_label();

        assert_eq!(
            Instruction::Plain(Opcode::new("iadd")).control_flow(),
            ControlFlow::Plain
        );
        assert_eq!(Instruction::Goto(l0).control_flow(), ControlFlow::Jump(l0));
        assert_eq!(Instruction::AThrow.control_flow(), ControlFlow::Terminal);
        assert_eq!(
            Instruction::LookupSwitch {
                default: l0,
                targets: vec![(1, l1), (4, l0)],
            }
            .control_flow(),
            ControlFlow::Switch {
                default: l0,
                cases: vec![l1, l0],
            }
        );
        assert!(!Instruction::If(BranchCondition::If(OrdComparison::EQ), l1).is_unconditional());
        assert!(Instruction::FallThrough(l1).is_unconditional());
        assert_eq!(Instruction::FallThrough(l1).jump_targets(), JumpTargets::None);
    }
}
