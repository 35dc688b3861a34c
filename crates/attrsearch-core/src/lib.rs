pub mod aggregate;
pub mod compiler;
pub mod errors;
pub mod model;
pub mod page;
pub mod query;
pub mod strategy;

pub use aggregate::aggregate;
pub use compiler::QueryCompiler;
pub use errors::*;
pub use model::*;
pub use page::*;
pub use query::*;
pub use strategy::*;
