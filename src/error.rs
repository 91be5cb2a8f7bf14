//! Errors surfaced by the `select` facade functions.

use core::fmt;

/// An error returned before a race is even constructed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectError {
    /// The caller supplied a range-form participant set with no elements.
    ///
    /// There is no meaningful winner to pick, so the range facade functions
    /// reject this up front rather than returning a future that can never
    /// resolve.
    EmptyInput,
}

impl fmt::Display for SelectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyInput => f.write_str("select: participant range is empty"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for SelectError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_display() {
        assert_eq!(
            alloc::format!("{}", SelectError::EmptyInput),
            "select: participant range is empty"
        );
    }
}
