//! Placement engine for insertster.
//!
//! Stages run in order: [`decorate`] attaches hits to nodes, [`propagate`]
//! aggregates them toward the root, [`score`] turns aggregates into
//! candidates, [`best`] picks one candidate per query and [`insert`] grafts
//! the chosen queries onto the tree. [`pipeline`] ties them together.

pub mod best;
pub mod decorate;
pub mod insert;
pub mod pipeline;
pub mod propagate;
pub mod registry;
pub mod score;

pub use pipeline::{Pipeline, PlacementReport, ProgressReporter, QueryStage, SilentProgress};
pub use propagate::Combine;
pub use registry::{Strategies, StrategyRegistry};
