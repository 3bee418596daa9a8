pub mod adapters;
pub mod aggregator;
pub mod cached;
pub mod registry;
pub mod synthesis;
pub mod throttle;

pub use aggregator::ResearchAggregator;
pub use cached::CachedSource;
pub use registry::SourceRegistry;
pub use synthesis::{Synthesis, Synthesizer};
pub use throttle::Throttle;
