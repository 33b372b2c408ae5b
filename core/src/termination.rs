//! # Functionality Related to Early Search Termination

use std::fmt;

/// Early termination reasons for [`crate::Solve::solve`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// Terminated because the wall-clock budget was exhausted
    TimeLimit,
    /// Termination because of external interrupt
    Interrupted,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::TimeLimit => {
                write!(f, "Search terminated early because of time limit")
            }
            Termination::Interrupted => {
                write!(f, "Search terminated early because of interrupt signal")
            }
        }
    }
}

/// Return type for functions that either return a value or were terminated early for some reason
#[derive(Debug, PartialEq, Eq)]
pub enum MaybeTerminated<T = ()> {
    /// The operation finished with a return value
    Done(T),
    /// The operation was terminated early
    Terminated(Termination),
}

impl<T> MaybeTerminated<T> {
    pub fn unwrap(self) -> T {
        match self {
            MaybeTerminated::Done(val) => val,
            MaybeTerminated::Terminated(term) => {
                panic!("called `MaybeTerminated::unwrap()` on a `Terminated` value: {term}")
            }
        }
    }
}

/// Unwraps a [`MaybeTerminated`] value or returns the termination from the enclosing function,
/// which must return `anyhow::Result<MaybeTerminated<_>>`
macro_rules! done {
    ($e:expr) => {
        match $e {
            crate::MaybeTerminated::Done(val) => val,
            crate::MaybeTerminated::Terminated(term) => {
                return Ok(crate::MaybeTerminated::Terminated(term))
            }
        }
    };
}
pub(crate) use done;
