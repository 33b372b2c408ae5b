//! # Instance Processing Happening _Before_ the Search
//!
//! Reading instances from the kplib benchmark library and sampling favoured solution spaces.

use std::{
    cmp, fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::Context;
use rand::{seq::SliceRandom, Rng};

use crate::types::{FavouredSpace, Instance, ItemSet, LinearCap};

/// The number of items of the smallest kplib instances. Smaller instances are truncated from
/// these.
pub const KPLIB_MIN_SIZE: usize = 50;

/// The kplib instance classes that can be read
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum InstanceKind {
    /// Weights and costs drawn independently
    Uncorrelated,
    /// Costs equal to weights plus a constant
    StronglyCorrelated,
}

impl InstanceKind {
    fn dir_name(self) -> &'static str {
        match self {
            InstanceKind::Uncorrelated => "00Uncorrelated",
            InstanceKind::StronglyCorrelated => "02StronglyCorrelated",
        }
    }
}

impl fmt::Display for InstanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstanceKind::Uncorrelated => write!(f, "uncorrelated"),
            InstanceKind::StronglyCorrelated => write!(f, "strongly_correlated"),
        }
    }
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("kplib only contains weight upper bounds 1000 and 10000, not {0}")]
    InvalidWeightBound(usize),
    #[error("kplib only contains instance indices 0 to 99, not {0}")]
    InvalidIndex(usize),
    #[error("instance size must be positive")]
    InvalidSize,
    #[error("instance file ends before line {0}")]
    MissingLine(usize),
    #[error("cannot parse line {line}: {content:?}")]
    InvalidLine { line: usize, content: String },
    #[error("instance file announces {expected} items but contains {found}")]
    ItemCountMismatch { expected: usize, found: usize },
    #[error("instance file has {found} items, cannot truncate to {requested}")]
    TooFewItems { found: usize, requested: usize },
    #[error("unknown favoured space type {0:?}, expected `p`, `n` or `c`")]
    UnknownFavouredKind(char),
}

/// Resolves the path of a kplib instance file
pub fn kplib_path<P: AsRef<Path>>(
    root: P,
    kind: InstanceKind,
    size: usize,
    weight_ub: usize,
    index: usize,
) -> Result<PathBuf, Error> {
    let bound_dir = match weight_ub {
        1000 => "R01000",
        10000 => "R10000",
        _ => return Err(Error::InvalidWeightBound(weight_ub)),
    };
    if index >= 100 {
        return Err(Error::InvalidIndex(index));
    }
    if size == 0 {
        return Err(Error::InvalidSize);
    }
    Ok(root
        .as_ref()
        .join(kind.dir_name())
        .join(format!("n{size:05}"))
        .join(bound_dir)
        .join(format!("s{index:03}.kp")))
}

/// Parses an instance in kplib format: a name line, the item count, the capacity, an empty line
/// and one `cost weight` line per item
pub fn parse_kplib<P: AsRef<Path>>(path: P) -> anyhow::Result<Instance> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read instance file {}", path.display()))?;
    parse_kplib_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn parse_number(lines: &[&str], idx: usize) -> Result<usize, Error> {
    let line = lines.get(idx).ok_or(Error::MissingLine(idx + 1))?;
    line.trim().parse().map_err(|_| Error::InvalidLine {
        line: idx + 1,
        content: line.to_string(),
    })
}

/// Parses the content of a kplib instance file
pub fn parse_kplib_str(content: &str) -> anyhow::Result<Instance> {
    let lines: Vec<&str> = content.lines().collect();
    let n_items = parse_number(&lines, 1)?;
    let capacity = parse_number(&lines, 2)?;
    let mut weights = Vec::with_capacity(n_items);
    let mut costs = Vec::with_capacity(n_items);
    for (idx, line) in lines.iter().enumerate().skip(4) {
        if line.trim().is_empty() {
            continue;
        }
        let invalid = || Error::InvalidLine {
            line: idx + 1,
            content: line.to_string(),
        };
        let mut fields = line.split_whitespace().map(|field| field.parse::<usize>());
        match (fields.next(), fields.next(), fields.next()) {
            (Some(Ok(cost)), Some(Ok(weight)), None) => {
                costs.push(cost);
                weights.push(weight);
            }
            _ => anyhow::bail!(invalid()),
        }
    }
    anyhow::ensure!(
        weights.len() == n_items,
        Error::ItemCountMismatch {
            expected: n_items,
            found: weights.len()
        }
    );
    Instance::new(weights, costs, capacity)
}

/// Loads a kplib instance of any size. Instances with fewer items than the smallest kplib
/// instances consist of the first items of the smallest instance with proportionally scaled
/// capacity.
pub fn load<P: AsRef<Path>>(
    root: P,
    kind: InstanceKind,
    size: usize,
    weight_ub: usize,
    index: usize,
) -> anyhow::Result<Instance> {
    if size >= KPLIB_MIN_SIZE {
        return parse_kplib(kplib_path(root, kind, size, weight_ub, index)?);
    }
    let inst = parse_kplib(kplib_path(root, kind, KPLIB_MIN_SIZE, weight_ub, index)?)?;
    truncated(inst, size)
}

/// Truncates an instance to its first `size` items
pub fn truncated(inst: Instance, size: usize) -> anyhow::Result<Instance> {
    anyhow::ensure!(size > 0, Error::InvalidSize);
    anyhow::ensure!(
        size <= inst.n_items(),
        Error::TooFewItems {
            found: inst.n_items(),
            requested: size
        }
    );
    Ok(inst.truncate(size))
}

/// The types of favoured constraints to sample, written as a combination of `p` (enforced items),
/// `n` (disallowed items) and `c` (a cap)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FavouredKinds {
    pub enforced: bool,
    pub disallowed: bool,
    pub caps: bool,
}

impl FavouredKinds {
    /// The number of selected types
    pub fn count(&self) -> usize {
        [self.enforced, self.disallowed, self.caps]
            .into_iter()
            .filter(|&sel| sel)
            .count()
    }
}

impl FromStr for FavouredKinds {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut kinds = FavouredKinds::default();
        for c in s.chars() {
            match c {
                'p' => kinds.enforced = true,
                'n' => kinds.disallowed = true,
                'c' => kinds.caps = true,
                _ => return Err(Error::UnknownFavouredKind(c)),
            }
        }
        Ok(kinds)
    }
}

impl fmt::Display for FavouredKinds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.enforced {
            write!(f, "p")?;
        }
        if self.disallowed {
            write!(f, "n")?;
        }
        if self.caps {
            write!(f, "c")?;
        }
        Ok(())
    }
}

/// Samples a favoured space around a nominal solution
///
/// - Enforced items are drawn from the items outside of the nominal solution.
/// - Disallowed items are drawn from the items in the nominal solution that are not enforced.
/// - The cap allows at most one of a random subset of all items.
///
/// Both enforced and disallowed items number about a tenth of the items that fit into the
/// capacity on average. Draws are limited by the number of available items.
pub fn sample_favoured<R: Rng + ?Sized>(
    inst: &Instance,
    nominal: &ItemSet,
    kinds: FavouredKinds,
    rng: &mut R,
) -> FavouredSpace {
    let n_items = inst.n_items();
    let mean_weight = inst.total_weight() as f64 / n_items as f64;
    let n_fixed = cmp::max((inst.capacity() as f64 / mean_weight / 10.).round() as usize, 1);

    let mut space = FavouredSpace::default();
    if kinds.enforced {
        let pool: Vec<usize> = (0..n_items).filter(|&idx| !nominal.contains(idx)).collect();
        space.enforced = pool.choose_multiple(rng, n_fixed).copied().collect();
    }
    if kinds.disallowed {
        let pool: Vec<usize> = (0..n_items)
            .filter(|&idx| nominal.contains(idx) && !space.enforced.contains(idx))
            .collect();
        space.disallowed = pool.choose_multiple(rng, n_fixed).copied().collect();
    }
    if kinds.caps {
        let n_capped = cmp::max((n_items as f64 / 10.).round() as usize, 1);
        let pool: Vec<usize> = (0..n_items).collect();
        let items = pool.choose_multiple(rng, n_capped).copied().collect();
        space.caps.push(LinearCap::new(items, 1));
    }
    space
}
