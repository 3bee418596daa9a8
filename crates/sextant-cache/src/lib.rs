pub mod key;
pub mod query_cache;
pub mod store;

pub use key::cache_key;
pub use query_cache::QueryCache;
pub use store::SqliteCacheStore;
