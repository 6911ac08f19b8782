//! Registries backing declarative pipelines.
//!
//! - [`ComponentRegistry`]: name → link factory, plus named links and middleware
//! - [`PipelineRegistry`]: name → [`PipelineDescriptor`], built into cached chains
//! - [`FlagStore`]: feature flags and per-environment configuration

mod components;
mod descriptor;
mod flags;
mod pipelines;

pub use components::{ComponentFactory, ComponentRegistry};
pub use descriptor::{PipelineDescriptor, StepDescriptor};
pub use flags::{is_truthy, FeatureFlag, FlagStore};
pub use pipelines::{CacheInfo, Execution, PipelineRegistry, PipelineStatistics};
