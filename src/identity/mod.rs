//! Network identity management
//!
//! This module owns the pool of (proxy, client signature) identities:
//! - Round-robin selection that skips blacklisted identities
//! - Success/failure accounting and the blacklist threshold
//! - Bounded health probes before stale identities are reused
//! - Client signature rotation

mod pool;
mod probe;
mod record;
mod signature;

pub use pool::{CheckReport, IdentityManager, IdentityPolicy, PoolStats};
pub use probe::{HealthProbe, HttpProbe, ProbeError};
pub use record::{Identity, IdentityId, IdentityState, ProxyEndpoint};
pub use signature::{DevicePlatform, SignatureRotator};
