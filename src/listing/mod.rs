//! Textual listings of classes
//!
//! The format is a small subset of what Jasmin accepts, restricted to what matters for control
//! flow:
//!
//! ```text
//! .class com/example/Foo
//!
//! .method bar(I)I
//!     iload_1
//!     ifeq L2
//!     goto L1
//! L1:
//!     iconst_0
//!     ireturn
//! L2:
//!     tableswitch 0 L1 L2 default L1
//! .catch java/lang/Exception from L1 to L2 using L2
//! .end method
//! ```
//!
//! Everything after a `;` (outside of a string literal) is a comment. Instructions which don't
//! affect control flow are kept verbatim. A block which runs into the next label falls through to
//! it, and a label with nothing after it at the end of a method is the method's end label.
//!
//! Labels of the form `L<n>` keep their number, so printing a parsed class gives back the same
//! label names.

mod parser;
mod printer;

pub use parser::parse_class;
pub use printer::{print_class, print_method, ClassListing, MethodListing};

use crate::jvm;
use std::fmt;

/// Syntax or well-formedness error in a listing
#[derive(Debug)]
pub struct Error {
    /// Line (1-based) on which the error was found
    pub line: usize,
    pub kind: ErrorKind,
}

#[derive(Debug)]
pub enum ErrorKind {
    /// Listing doesn't start with `.class`
    ExpectedClass,

    /// Directive that isn't valid here
    UnexpectedDirective(String),

    /// Instruction or label outside of a method
    OutsideMethod,

    /// Method has no `.end method`
    UnterminatedMethod,

    /// `.method` header without a `name(descriptor)`
    MalformedMethodHeader(String),

    MalformedName(String),

    /// `.catch` that isn't `.catch TYPE from L to L using L`
    MalformedCatch,

    /// Instruction missing an operand (or with an operand that isn't the right shape)
    BadOperands(String),

    BadInteger(String),

    /// Subroutines (`jsr` and `ret`) are not supported
    UnsupportedInstruction(String),

    /// Label defined more than once
    DuplicateLabel(String),

    /// Label referenced but never defined
    UnknownLabel(String),

    /// The last instruction of the method can fall through to nothing
    FallsOffEnd,

    /// Method parsed fine but isn't a well-formed control flow graph
    Method(jvm::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: ", self.line)?;
        match &self.kind {
            ErrorKind::ExpectedClass => write!(f, "expected `.class`"),
            ErrorKind::UnexpectedDirective(directive) => {
                write!(f, "unexpected directive `{}`", directive)
            }
            ErrorKind::OutsideMethod => write!(f, "code outside of a method"),
            ErrorKind::UnterminatedMethod => write!(f, "method is missing `.end method`"),
            ErrorKind::MalformedMethodHeader(header) => {
                write!(f, "malformed method header `{}`", header)
            }
            ErrorKind::MalformedName(msg) => f.write_str(msg),
            ErrorKind::MalformedCatch => {
                write!(f, "expected `.catch TYPE from LABEL to LABEL using LABEL`")
            }
            ErrorKind::BadOperands(mnemonic) => write!(f, "bad operands for `{}`", mnemonic),
            ErrorKind::BadInteger(text) => write!(f, "`{}` is not a valid integer", text),
            ErrorKind::UnsupportedInstruction(mnemonic) => {
                write!(f, "`{}` is not supported", mnemonic)
            }
            ErrorKind::DuplicateLabel(name) => write!(f, "label `{}` is defined twice", name),
            ErrorKind::UnknownLabel(name) => write!(f, "label `{}` is never defined", name),
            ErrorKind::FallsOffEnd => write!(f, "code falls off the end of the method"),
            ErrorKind::Method(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {}
