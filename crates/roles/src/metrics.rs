//! Session metrics.

use metrics::Counter;

#[derive(Clone, Debug)]
pub struct SessionMetrics {
    /// Sessions opened, any role
    pub(crate) sessions_opened: Counter,
    /// Sessions whose completion join fired
    pub(crate) sessions_completed: Counter,
    /// Sessions that ran past their deadline
    pub(crate) sessions_timed_out: Counter,
    /// Bundles that passed the verification pipeline
    pub(crate) chunks_verified: Counter,
    /// Bundles rejected by the verification pipeline
    pub(crate) chunks_rejected: Counter,
    /// Reports accepted by the ledger
    pub(crate) reports_submitted: Counter,
}

impl Default for SessionMetrics {
    fn default() -> Self {
        Self {
            sessions_opened: metrics::counter!("tether.sessions.opened_total"),
            sessions_completed: metrics::counter!("tether.sessions.completed_total"),
            sessions_timed_out: metrics::counter!("tether.sessions.timed_out_total"),
            chunks_verified: metrics::counter!("tether.chunks.verified_total"),
            chunks_rejected: metrics::counter!("tether.chunks.rejected_total"),
            reports_submitted: metrics::counter!("tether.reports.submitted_total"),
        }
    }
}

impl SessionMetrics {
    pub(crate) fn chunk(&self, accepted: bool) {
        if accepted {
            self.chunks_verified.increment(1);
        } else {
            self.chunks_rejected.increment(1);
        }
    }
}
