//! The last-transaction-time watermark shared by all calls of one session.

use std::sync::atomic::{AtomicI64, Ordering};

/// Monotonic microsecond watermark of the most recent database state a
/// session is known to have observed.
///
/// The value never decreases over the watermark's lifetime; zero means
/// nothing has been observed yet. Monotonicity is guaranteed within one
/// instance only.
#[derive(Debug, Default)]
pub(crate) struct TxnTime {
    last_seen: AtomicI64,
}

impl TxnTime {
    /// Raises the watermark to `candidate` iff it is strictly newer.
    ///
    /// Safe under unbounded concurrent callers: the compare-exchange
    /// retry loop ensures the final value is the maximum of all
    /// candidates ever offered. Equal or smaller candidates are a no-op.
    pub(crate) fn observe(&self, candidate: i64) {
        loop {
            let last_seen = self.last_seen.load(Ordering::SeqCst);
            if last_seen >= candidate
                || self
                    .last_seen
                    .compare_exchange(last_seen, candidate, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            {
                break;
            }
        }
    }

    /// The watermark's current value; zero until first observed.
    pub(crate) fn current(&self) -> i64 {
        self.last_seen.load(Ordering::SeqCst)
    }

    /// Value for the outgoing consistency header, absent until the first
    /// observation.
    pub(crate) fn header_value(&self) -> Option<String> {
        match self.current() {
            0 => None,
            last_seen => Some(last_seen.to_string()),
        }
    }
}
