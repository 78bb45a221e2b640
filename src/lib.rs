pub mod cluster;
pub mod compiler;
pub mod config;
pub mod dsl;
pub mod error;
pub mod nodes;
pub mod runtime;

pub use error::{Result, WanoError};
pub use runtime::model::WanoModelRoot;
pub use runtime::render::{ExecutionDescriptor, RenderContext, RenderOutput};
