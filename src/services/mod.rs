// Service exports
pub mod cache;
pub mod clock;
pub mod dispatcher;
pub mod nearby;
pub mod places_api;
pub mod rate_limiter;
pub mod retry;
pub mod transport;

pub use cache::{CacheEntry, CacheStats, ResultCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dispatcher::{DispatchError, DispatchPolicy, FetchOutcome, MirrorDispatcher};
pub use nearby::{NearbyError, NearbyService, OsmMode, StartupError};
pub use places_api::{PlacesApiClient, PlacesApiError};
pub use rate_limiter::{RateLimitDecision, RateLimiter};
pub use retry::{Backoff, RetryPolicy};
pub use transport::{OverpassTransport, ReqwestTransport, TlsMode, TransportError};
