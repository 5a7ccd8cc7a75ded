//! Tool registry and the Code Mode meta-tools

pub mod code_mode;
mod registry;

pub use registry::{ToolContext, ToolDef, ToolHandler, ToolRegistry};
