pub mod cache;
pub mod clock;
pub mod lru_cache;
pub mod metrics_cache;
pub mod ttl_cache;

pub use cache::*;
pub use clock::*;
pub use lru_cache::*;
pub use metrics_cache::*;
pub use ttl_cache::*;
