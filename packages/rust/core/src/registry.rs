//! Named strategy registries.
//!
//! A [`StrategyRegistry`] is built once per run, holds every score, best
//! and length function by name, and resolves a [`PlacementConfig`] into a
//! [`Strategies`] set before any traversal starts.

use std::str::FromStr;

use insertster_shared::{InsertsterError, PlacementConfig, Result};

use crate::best::{BestFunction, FirstAbove, MaxLowestId, MaxNearTip, MaxNoRoot};
use crate::insert::{DivergenceLength, LengthFunction, TipMeanLength, ZeroLength};
use crate::propagate::Combine;
use crate::score::{AggregateScore, FBetaMeasure, HitCount, ScoreFunction};

/// Default selection policy.
pub const DEFAULT_BEST_FUNCTION: &str = "max-near-tip";

/// Default branch length function.
pub const DEFAULT_LENGTH_FUNCTION: &str = "zero";

/// Holds the registered strategies.
pub struct StrategyRegistry {
    score: Vec<Box<dyn ScoreFunction>>,
    best: Vec<Box<dyn BestFunction>>,
    length: Vec<Box<dyn LengthFunction>>,
}

/// Strategies resolved for one run.
#[derive(Clone, Copy)]
pub struct Strategies<'a> {
    pub score: &'a dyn ScoreFunction,
    pub best: &'a dyn BestFunction,
    pub length: &'a dyn LengthFunction,
    pub combine: Combine,
}

impl StrategyRegistry {
    /// Create a registry with every built-in strategy.
    pub fn new() -> Self {
        Self {
            score: vec![
                Box::new(FBetaMeasure::f1()),
                Box::new(FBetaMeasure::fhalf()),
                Box::new(FBetaMeasure::f2()),
                Box::new(AggregateScore),
                Box::new(HitCount),
            ],
            best: vec![
                Box::new(MaxNearTip),
                Box::new(MaxNoRoot),
                Box::new(MaxLowestId),
                Box::new(FirstAbove),
            ],
            length: vec![
                Box::new(ZeroLength),
                Box::new(DivergenceLength),
                Box::new(TipMeanLength),
            ],
        }
    }

    /// Register an additional score function. Lookups return the first
    /// registration of a name.
    pub fn register_score(&mut self, function: Box<dyn ScoreFunction>) {
        self.score.push(function);
    }

    pub fn register_best(&mut self, function: Box<dyn BestFunction>) {
        self.best.push(function);
    }

    pub fn register_length(&mut self, function: Box<dyn LengthFunction>) {
        self.length.push(function);
    }

    pub fn score_function(&self, name: &str) -> Result<&dyn ScoreFunction> {
        lookup(&self.score, name, "score function", |f| f.name())
    }

    pub fn best_function(&self, name: &str) -> Result<&dyn BestFunction> {
        lookup(&self.best, name, "best function", |f| f.name())
    }

    pub fn length_function(&self, name: &str) -> Result<&dyn LengthFunction> {
        lookup(&self.length, name, "length function", |f| f.name())
    }

    pub fn score_functions(&self) -> impl Iterator<Item = &dyn ScoreFunction> {
        self.score.iter().map(|f| f.as_ref())
    }

    pub fn best_functions(&self) -> impl Iterator<Item = &dyn BestFunction> {
        self.best.iter().map(|f| f.as_ref())
    }

    pub fn length_functions(&self) -> impl Iterator<Item = &dyn LengthFunction> {
        self.length.iter().map(|f| f.as_ref())
    }

    /// Validate `config` and resolve every strategy it names.
    pub fn resolve(&self, config: &PlacementConfig) -> Result<Strategies<'_>> {
        config.validate()?;

        Ok(Strategies {
            score: self.score_function(&config.score_function)?,
            best: self.best_function(config.best_function.as_deref().unwrap_or(DEFAULT_BEST_FUNCTION))?,
            length: self
                .length_function(config.length_function.as_deref().unwrap_or(DEFAULT_LENGTH_FUNCTION))?,
            combine: Combine::from_str(&config.combine)?,
        })
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn lookup<'a, T: ?Sized>(
    entries: &'a [Box<T>],
    name: &str,
    kind: &str,
    name_of: impl Fn(&T) -> &str,
) -> Result<&'a T> {
    entries
        .iter()
        .map(|e| &**e)
        .find(|e| name_of(*e) == name)
        .ok_or_else(|| {
            let available: Vec<&str> = entries.iter().map(|e| name_of(&**e)).collect();
            InsertsterError::config(format!(
                "unknown {kind} '{name}' (available: {})",
                available.join(", ")
            ))
        })
}
