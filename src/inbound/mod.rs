// Inbound webhook ingestion
//
//   gateway      – HTTP endpoint: rate limit, verify, parse, route
//   router       – event type to handler table, channel fan-out
//   channel_map  – event type to destination channel ids
//   rate_limiter – per-IP rolling window

pub mod channel_map;
pub mod gateway;
pub mod rate_limiter;
pub mod router;

pub use channel_map::{ChannelMap, ChannelMapError};
pub use gateway::{GatewayRejection, GatewayState};
pub use rate_limiter::{CleanupTask, RateLimiter};
pub use router::{EventRouter, RouteOutcome};
