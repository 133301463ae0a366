pub mod cancel;
pub mod dedup;
pub mod fetcher;
pub mod pipeline;
pub mod priority;
pub mod publish;
pub mod runner;
pub mod summarizer;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use cancel::{CancelHandle, CancelSignal};
pub use runner::{mention_query, DigestDeps, DigestRunner};
