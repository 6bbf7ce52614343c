//! Identifier sequence owned by one catalog session.

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Monotonic counter plus a session tag, so temporary names from
/// concurrent sessions never collide.
#[derive(Debug)]
pub struct SequenceGenerator {
    session: String,
    next: AtomicU64,
}

impl SequenceGenerator {
    pub fn new() -> Self {
        let session = Uuid::new_v4().simple().to_string();
        Self {
            session: session[..8].to_string(),
            next: AtomicU64::new(1),
        }
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn next_value(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// `tmp_<session>_<n>`
    pub fn temporary_name(&self) -> String {
        format!("tmp_{}_{}", self.session, self.next_value())
    }
}

impl Default for SequenceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_monotonic() {
        let seq = SequenceGenerator::new();
        assert_eq!(seq.next_value(), 1);
        assert_eq!(seq.next_value(), 2);
        let name = seq.temporary_name();
        assert_eq!(name, format!("tmp_{}_3", seq.session()));
    }

    #[test]
    fn test_sessions_differ() {
        let a = SequenceGenerator::new();
        let b = SequenceGenerator::new();
        assert_ne!(a.session(), b.session());
        assert_eq!(a.session().len(), 8);
    }
}
