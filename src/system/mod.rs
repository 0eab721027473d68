//! Host network state
//!
//! Read-only snapshots of kernel tables the proxy consults: which IPv6
//! addresses this host owns, and which interface routes to a given
//! destination. Both are procfs-backed and cached with a short TTL.

mod addresses;
mod routes;

pub use addresses::LocalAddressTable;
pub use routes::RouteTable;
