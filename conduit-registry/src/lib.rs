#![deny(missing_docs)]
//! Plugin registries and the stage resolver.
//!
//! Three buckets hold handlers, each built once at bootstrap:
//!
//! | Bucket | Key | Holds |
//! |--------|-----|-------|
//! | [`PredefinedBucket`] | ([`PredefinedStage`], plugin id) | variants of the fixed pipeline stages |
//! | [`ActivityRegistry`] | name | cross-cutting plugins, merge policies |
//! | [`CustomBucket`] | name | user stages and capabilities |
//!
//! [`StageResolver`] consults them in that order and stops at the first
//! hit. Builders reject duplicate keys and predefined names in the custom
//! bucket, so a built resolver never has to choose between two handlers.

mod bucket;
mod predefined;
mod resolver;

pub use bucket::{
    ActivityRegistry, ActivityRegistryBuilder, CustomBucket, CustomBucketBuilder,
    PredefinedBucket, PredefinedBucketBuilder,
};
pub use predefined::{ParseStageError, PredefinedStage};
pub use resolver::{ResolutionTier, ResolverConfig, StageResolver};
