//! Per-host session persistence
//!
//! Cookies collected by browser sessions are saved per host so a restarted
//! process presents the same session state to a destination it has already
//! visited.

mod store;

pub use store::{SessionStore, StoredCookie};
