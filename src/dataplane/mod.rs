//! Proxy core
//!
//! Policy lives here, free of sockets: decoded NDP events come in,
//! `Output` values describing the frames to send come out. The daemon
//! loop performs the actual I/O.

mod engine;
mod proxy;
mod rule;
mod session;

pub use engine::Engine;
pub use proxy::{Output, Proxy};
pub use rule::{Rule, RuleTarget};
pub use session::{Session, SessionStatus, SessionStore, NEGATIVE_CACHE_TTL_MS};
