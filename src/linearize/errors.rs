use crate::jvm;
use crate::jvm::code::SynLabel;
use std::fmt;

/// Reasons the linearizer gives up on a method (leaving it untouched)
#[derive(Debug)]
pub enum Error {
    /// Input or output body is not a well-formed control flow graph
    Malformed(jvm::Error),

    /// Block that is neither reachable from the entry nor an exception handler target
    UnscheduledBlock(SynLabel),

    /// Protected ranges whose priorities can't be expressed as an ordered exception table over
    /// the new block order (eg. three handlers whose priorities form a cycle)
    UnrepresentableExceptionTable {
        /// Number of chains left over when no further progress could be made
        remaining_chains: usize,
    },
}

impl From<jvm::Error> for Error {
    fn from(err: jvm::Error) -> Error {
        Error::Malformed(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Malformed(err) => write!(f, "malformed method body: {}", err),
            Error::UnscheduledBlock(lbl) => write!(
                f,
                "block {:?} is neither reachable nor an exception handler",
                lbl
            ),
            Error::UnrepresentableExceptionTable { remaining_chains } => write!(
                f,
                "exception table can't be represented ({} chains have cyclic priorities)",
                remaining_chains
            ),
        }
    }
}
