//! Observable pool events (spec §6.3)
//!
//! Pure observability: a listener must never be relied on to make the
//! pool correct. `LoggingListener` is the reference listener, forwarding
//! every event to the `log` crate the way `minisql`'s checkpoint/recovery
//! code logs its own outcomes.

use serde::{Deserialize, Serialize};

/// A structured event emitted at one of the points named in spec §6.3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum PoolEvent {
    Open,
    Closed,
    Get,
    Create,
    CreateError { message: String },
    LockSuccess,
    LockBusy { reason: String },
    LockClose { reason: String },
    Unlock,
    Return,
    NotLocked,
    NotLockOwner,
    Expire,
    OutOfPoolClose,
    UnexpectedClose,
    ExResend,
}

/// Pluggable listener. Behaviour must never depend on whether one is
/// installed.
pub trait PoolEventListener: Send + Sync {
    fn on_event(&self, table: &str, event: &PoolEvent);
}

/// Default listener: drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl PoolEventListener for NoopListener {
    fn on_event(&self, _table: &str, _event: &PoolEvent) {}
}

/// Forwards every event to the `log` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingListener;

impl PoolEventListener for LoggingListener {
    fn on_event(&self, table: &str, event: &PoolEvent) {
        match event {
            PoolEvent::CreateError { message } => {
                log::warn!("writer pool: '{}' create failed: {}", table, message)
            }
            PoolEvent::UnexpectedClose => {
                log::warn!("writer pool: '{}' unexpected double close", table)
            }
            PoolEvent::LockBusy { reason } => {
                log::debug!("writer pool: '{}' lock busy: {}", table, reason)
            }
            other => log::debug!("writer pool: '{}' {:?}", table, other),
        }
    }
}
