//! NAT table components
//!
//! Flow identity derivation, per-bucket translation id allocation, and the
//! translation table with its locking and eviction policy.

mod allocator;
mod flow;
mod table;

pub use allocator::IdAllocator;
pub use flow::{Bucket, Flow, FlowKey, IdentityMode, IpVersion, Protocol};
pub use table::{NatEntry, NatTable, NatTimeouts, RemovalReason};
