//! Tool catalog
//!
//! Maps a tool name to its invocation contract: compiled-in sub-agents plus
//! external APIs registered at runtime.

pub mod catalog;
pub mod definition;
pub mod descriptor;
pub mod registry;

pub use catalog::ToolCatalog;
pub use definition::SchemaBuilder;
pub use descriptor::{
    AuthLocation, AuthSpec, CustomToolDefinition, ExternalApiSpec, InvocationSpec, ToolDescriptor,
    ToolKind,
};
pub use registry::{SqliteToolRegistry, ToolRegistry};
