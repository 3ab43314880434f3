//! Method bodies as control flow graphs
//!
//! ### Structure
//!
//! A method body is an ordered sequence of [`BasicBlock`]s, each starting at a [`SynLabel`].
//! Instructions come in two flavours:
//!
//!   - plain instructions (anything that does not touch control flow) are kept as an opaque
//!     [`Opcode`] and are carried through untouched
//!   - everything that transfers control gets its own variant of [`Instruction`], so that the
//!     successors of a block are always explicit
//!
//! Blocks always end in an unconditional transfer: `goto`, a switch, a return, `athrow`, or the
//! synthetic [`Instruction::FallThrough`] marker. This means that the order of blocks carries no
//! meaning on its own - any permutation of the blocks is the same program, which is exactly the
//! freedom [`crate::linearize`] exploits. Conditional branches can appear in the middle of a
//! block (the alternative being the next instruction).
//!
//! ### Exceptions
//!
//! Exception handlers are expressed the same way as in class files: an ordered list of
//! [`ExceptionEntry`] ranges over the block order, where the first matching entry wins.

mod basic_block;
mod exceptions;
mod instructions;
mod label;

pub use basic_block::*;
pub use exceptions::*;
pub use instructions::*;
pub use label::*;
