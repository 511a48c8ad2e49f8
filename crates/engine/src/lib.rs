pub mod compiler;
pub mod error;
pub mod graph;
pub mod render;
pub mod timeline;

pub use compiler::*;
pub use error::CompileError;
pub use graph::*;
pub use timeline::*;
