//! # Options
//!
//! This module contains all configuration options of the counterfactual search.

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

/// The kind of counterfactual explanation to search for
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum CfKind {
    /// The favoured optimum only needs to tie with the best solution outside the favoured space
    #[default]
    Weak,
    /// The favoured optimum must strictly beat every solution outside the favoured space
    Strong,
}

impl CfKind {
    pub fn is_strong(self) -> bool {
        self == CfKind::Strong
    }
}

impl fmt::Display for CfKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CfKind::Weak => write!(f, "weak"),
            CfKind::Strong => write!(f, "strong"),
        }
    }
}

/// Configuration options of the counterfactual search
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CfOptions {
    /// Weak or strong counterfactuals
    pub kind: CfKind,
    /// The maximum relative deviation of every weight, e.g., `0.05` for 5%
    pub max_deviation: f64,
    /// The optimality gap at which the scan over target objectives stops
    pub epsilon: f64,
}

impl Default for CfOptions {
    fn default() -> Self {
        CfOptions {
            kind: CfKind::default(),
            max_deviation: 0.05,
            epsilon: 0.001,
        }
    }
}

/// Limits for a call to [`crate::Solve::solve`]
#[derive(Clone, Copy, Debug, Default)]
pub struct Limits {
    /// The wall-clock budget of the entire search
    pub time: Option<Duration>,
}

impl Limits {
    /// No limits
    pub fn none() -> Limits {
        Limits { time: None }
    }

    pub fn time(time: Duration) -> Limits {
        Limits { time: Some(time) }
    }
}
