//! The single in-flight request per client session.
//!
//! State machine: idle -> pending (lease held, send UI disabled) ->
//! completed | cancelled -> idle. At most one lease exists at a time; taking
//! a new one implicitly cancels the old.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Descriptor of the request currently being produced.
#[derive(Debug, Clone)]
pub struct RequestLease {
    pub conv_id: String,
    /// Id of the AI message this request is streaming into.
    pub message_id: String,
    cancel: CancellationToken,
}

impl RequestLease {
    /// Handle the backend task observes for cooperative cancellation.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Single writer of the request lease.
#[derive(Debug, Default)]
pub struct RequestLifecycleManager {
    lease: Option<RequestLease>,
}

impl RequestLifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lease for a new request. A prior lease is superseded: its
    /// cancellation handle is invoked before the new lease is recorded.
    pub fn start_request(&mut self, conv_id: &str, message_id: &str) -> CancellationToken {
        if let Some(prior) = self.lease.take() {
            info!(
                prior_message_id = %prior.message_id,
                message_id = %message_id,
                "superseding in-flight request"
            );
            prior.cancel.cancel();
        }

        let cancel = CancellationToken::new();
        info!(conv_id = %conv_id, message_id = %message_id, "request lease acquired");
        self.lease = Some(RequestLease {
            conv_id: conv_id.to_string(),
            message_id: message_id.to_string(),
            cancel: cancel.clone(),
        });
        cancel
    }

    /// Invoke the cancellation handle and clear the lease. Idempotent:
    /// cancelling with no lease is a no-op, since the user may click cancel
    /// after the request already completed.
    pub fn cancel(&mut self) -> Option<RequestLease> {
        match self.lease.take() {
            Some(lease) => {
                info!(message_id = %lease.message_id, "cancelling request");
                lease.cancel.cancel();
                Some(lease)
            }
            None => {
                debug!("cancel with no active lease, no-op");
                None
            }
        }
    }

    /// Clear the lease on normal completion. Streaming state is untouched:
    /// completion and stream-end arrive on different channels, in either
    /// order.
    pub fn complete(&mut self) -> Option<RequestLease> {
        let lease = self.lease.take();
        if let Some(lease) = &lease {
            info!(message_id = %lease.message_id, "request completed");
        } else {
            debug!("complete with no active lease, no-op");
        }
        lease
    }

    pub fn is_busy(&self) -> bool {
        self.lease.is_some()
    }

    pub fn current(&self) -> Option<&RequestLease> {
        self.lease.as_ref()
    }
}
