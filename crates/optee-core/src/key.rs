//! Transaction keys.
//!
//! The driver matches every RPC response to its pending command by key, so a
//! key must not be shared by two live transactions on the same handle. Keys
//! come from a process-wide counter rather than the calling thread id, since
//! thread ids are recycled once a thread exits.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_KEY: AtomicU32 = AtomicU32::new(1);

/// Correlation id shared by a command and all of its RPC responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionKey(u32);

impl TransactionKey {
    /// Allocate a fresh key. Never returns 0.
    pub fn generate() -> Self {
        loop {
            let key = NEXT_KEY.fetch_add(1, Ordering::Relaxed);
            if key != 0 {
                return Self(key);
            }
        }
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}
