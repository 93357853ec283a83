//! Folio domain rules
//!
//! Pure logic shared by the storage layer and the HTTP handlers:
//! streak accounting, moderation transitions, A/B statistics and the
//! signatures used by the payment webhook and channel authorization.
//! Nothing in here touches the database or the network.

pub mod channels;
pub mod moderation;
pub mod stats;
pub mod streak;
pub mod webhook;
