//! Error types for the trace data model.

use std::error::Error;
use std::fmt;

/// Errors from building or validating a delta-encoded stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamError {
    /// An appended element's index is not past the previous element's.
    IndexNotIncreasing {
        /// Absolute index of the previous element.
        previous: u64,
        /// The rejected index.
        index: u64,
    },
    /// The index gap does not fit the 32-bit delta field.
    IndexGapTooLarge {
        /// Absolute index of the previous element.
        previous: u64,
        /// The rejected index.
        index: u64,
    },
    /// The value change cannot be expressed as this stream's delta type
    /// (too large, or decreasing on a monotonic stream).
    ValueDeltaOutOfRange {
        /// Previous absolute value.
        previous: u64,
        /// The rejected value.
        value: u64,
    },
    /// A stored delta element has `index_delta == 0`.
    ZeroIndexDelta {
        /// Position of the offending element within the stream.
        position: usize,
    },
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexNotIncreasing { previous, index } => {
                write!(f, "index {index} does not follow previous index {previous}")
            }
            Self::IndexGapTooLarge { previous, index } => {
                write!(f, "index gap {previous} -> {index} exceeds 32 bits")
            }
            Self::ValueDeltaOutOfRange { previous, value } => {
                write!(f, "value change {previous} -> {value} not representable")
            }
            Self::ZeroIndexDelta { position } => {
                write!(f, "element {position} has a zero index delta")
            }
        }
    }
}

impl Error for StreamError {}

/// Errors from decoding the advanced-event word stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AdvancedEventError {
    /// The header declares more arguments than its width byte describes.
    TooManyArguments {
        /// Word offset of the header.
        offset: usize,
        /// Declared argument count.
        n_args: u8,
    },
    /// The stream ends inside the argument list.
    Truncated {
        /// Word offset of the header.
        offset: usize,
        /// Argument words the header declares.
        needed: usize,
        /// Words left after the header.
        available: usize,
    },
}

impl fmt::Display for AdvancedEventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooManyArguments { offset, n_args } => {
                write!(f, "advanced event at word {offset} declares {n_args} arguments")
            }
            Self::Truncated {
                offset,
                needed,
                available,
            } => write!(
                f,
                "advanced event at word {offset} needs {needed} argument words, {available} left"
            ),
        }
    }
}

impl Error for AdvancedEventError {}
