#[cfg(feature = "elasticsearch")]
pub mod elastic;
pub mod es_dsl;
pub mod executor;
pub mod matching;
pub mod mem;
pub mod service;
pub mod traits;

#[cfg(feature = "elasticsearch")]
pub use elastic::{ElasticBackend, ElasticConfig};
pub use executor::SearchExecutor;
pub use mem::InMemoryBackend;
pub use service::SearchService;
pub use traits::*;
