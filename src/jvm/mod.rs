//! Model of JVM method bodies
//!
//! ### Structure
//!
//! Only the parts of a class file that matter for control flow are modelled. A [`model::Class`]
//! is a named bag of [`model::Method`]s, and a method body is an ordered sequence of labelled
//! [`code::BasicBlock`]s along with an exception table. Straight-line instructions are kept
//! opaque (we never need to know what `iadd` does), while every instruction that can transfer
//! control is spelled out in [`code::Instruction`] so that the control flow graph can be recovered
//! without any outside help.

pub mod code;
mod errors;
pub mod model;
mod names;

pub use errors::*;
pub use names::*;
