use super::code::{Instruction, SynLabel};
use std::fmt;

/// Ways in which a method body can fail to be a well-formed control flow graph
#[derive(Debug)]
pub enum Error {
    /// Method has no blocks at all
    EmptyMethod,

    /// Two blocks claim to have the same label
    DuplicateLabel(SynLabel),

    /// A jump, switch, fallthrough or exception entry refers to a label that is not placed
    UnknownLabel(SynLabel),

    /// Block does not end in a `goto`, switch, return, `athrow` or fallthrough
    MissingTerminator(SynLabel),

    /// Unconditional transfer in the middle of a block (everything after it would be dead)
    TransferBeforeEndOfBlock {
        block: SynLabel,
        instruction: Instruction,
    },

    /// Exception entry whose `start` does not strictly precede its `end`
    EmptyExceptionRange {
        start: SynLabel,
        end: SynLabel,
    },

    /// The end sentinel label is also used as a block label
    EndLabelIsBlock(SynLabel),

    /// A name (class, method, or caught type) is invalid
    MalformedName(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::EmptyMethod => write!(f, "method has no code"),
            Error::DuplicateLabel(lbl) => write!(f, "label {:?} is placed twice", lbl),
            Error::UnknownLabel(lbl) => write!(f, "label {:?} is referenced but never placed", lbl),
            Error::MissingTerminator(lbl) => {
                write!(f, "block {:?} does not end in a control transfer", lbl)
            }
            Error::TransferBeforeEndOfBlock { block, instruction } => write!(
                f,
                "block {:?} has an unconditional transfer {:?} before its end",
                block, instruction
            ),
            Error::EmptyExceptionRange { start, end } => write!(
                f,
                "exception range {:?}..{:?} does not cover anything",
                start, end
            ),
            Error::EndLabelIsBlock(lbl) => {
                write!(f, "end label {:?} is also used to label a block", lbl)
            }
            Error::MalformedName(msg) => f.write_str(msg),
        }
    }
}
