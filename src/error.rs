use std::result;

use thiserror::Error;

/// Result alias used by every fallible operation in this crate
pub type Result<T> = result::Result<T, Error>;

/// Possible errors when generating positions or editing a sequence
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The lower bound handed to position generation does not sort strictly before the upper
    /// bound. Callers must pass neighbours in `(prev, next)` order.
    #[error("lower position does not sort strictly before upper position")]
    OrderInversion,

    /// An atom sorts before the predecessor found while scanning, or after the last atom of the
    /// container. Either the container is not sorted or the atom's position is bogus.
    #[error("atom is out of order with the atom at index {index}")]
    OutOfOrder {
        /// Index of the neighbour the atom is out of order with
        index: usize,
    },

    /// The scan for an insertion slot ran off the end of the container.
    ///
    /// This never happens for a container bounded by the MIN and MAX sentinels and signals a bug
    /// rather than bad input.
    #[error("insertion scan exhausted the sequence without resolving a slot")]
    ExhaustedScan,

    /// The sentinel site id (`S::default()`) was used to generate a position.
    #[error("the default site id is reserved for sentinel atoms")]
    ReservedSite,

    /// The bounds are ordered but nothing fits between them: `next` is `prev` followed only by
    /// sentinel digits `<0, default>`.
    #[error("no position fits between the given bounds")]
    NoRoom,

    /// An identifier carries a digit above `MAX_POS`.
    #[error("identifier digit {n} exceeds the maximum digit")]
    DigitOutOfRange {
        /// The offending digit
        n: u16,
    },

    /// A list of atoms does not satisfy the sequence invariants.
    #[error("malformed sequence: {0}")]
    MalformedSequence(&'static str),
}
