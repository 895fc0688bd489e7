//! Binding generation for toolbind: schema-to-type compilation, per-tool
//! call-stub synthesis, and the freshness orchestration that decides on
//! each startup whether to regenerate, reuse, or fall back to a previous
//! generation.

pub mod catalog;
pub mod freshness;
pub mod generator;
pub mod schema;

pub use catalog::TransportCatalogSource;
pub use freshness::{BindingManager, CatalogSource, EnsureReport, Freshness, HostReport};
pub use generator::{BindingGenerator, GenerationMetadata, GenerationResult};
pub use schema::{RustSchemaCompiler, SchemaCompiler};
