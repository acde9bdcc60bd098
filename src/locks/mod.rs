//! Lock engine
//!
//! This module provides the manager-scoped mutual exclusion machinery:
//! - `LockManager`: factory and global registry for all locks of a manager
//! - `Lock`: reentrant lock handle with FIFO waiter ordering
//! - `deadlock`: wait-for-graph cycle detection and victim recovery

pub mod deadlock;
pub mod lock_manager;

pub use lock_manager::{Lock, LockListener};

pub(crate) use lock_manager::LockManager;
