pub use crate::builder::{Cache, CacheBuilder, CachePolicy};
pub use crate::ds::{GhostFifo, SlotId, SlotList};
pub use crate::error::{ConfigError, InvariantError};
pub use crate::policy::s3_fifo::S3FifoCache;
pub use crate::policy::sieve::SieveCache;
pub use crate::traits::{CoreCache, MutableCache, ReadOnlyCache};

#[cfg(feature = "concurrency")]
pub use crate::policy::s3_fifo::ConcurrentS3FifoCache;
#[cfg(feature = "concurrency")]
pub use crate::policy::sieve::ConcurrentSieveCache;
#[cfg(feature = "concurrency")]
pub use crate::traits::ConcurrentCache;
