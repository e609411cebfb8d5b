//! Remote session management
//!
//! This module provides the `SessionClient` abstraction for the vendor
//! streaming control plane:
//! - Session sweep, creation, activation and teardown
//! - Task dispatch and interruption
//! - Keep-alive scheduling
//! - Tolerant decoding of the vendor's response envelopes

mod config;
mod envelope;
mod keepalive;
mod session;
mod types;

pub use config::SessionConfig;
pub use keepalive::spawn_keep_alive;
pub use session::{CreateSessionOptions, SessionClient};
pub use types::{AvatarDescriptor, Session, SessionDescriptor, TaskInfo, TaskKind, TaskMode};
