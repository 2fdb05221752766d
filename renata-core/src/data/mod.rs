//! Market data: the provider contract and its implementations.

pub mod cache;
pub mod caching;
pub mod circuit_breaker;
pub mod memory;
pub mod polygon;
pub mod provider;
pub mod synthetic;

pub use cache::{CacheMeta, ParquetCache};
pub use caching::CachingProvider;
pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use memory::InMemoryProvider;
pub use polygon::{PolygonConfig, PolygonProvider};
pub use provider::{DataError, GroupedDaily, MarketDataProvider};
pub use synthetic::{generate_bars, synthetic_provider, SyntheticConfig};
