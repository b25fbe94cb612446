//! Fan-out of final outcomes to delivery targets.

use crate::types::{AssetOutcome, RequestId, RequestState};

use super::Waiter;

/// Receiver of a request's final outcome
///
/// Called exactly once per request, on whatever task finished the transfer
/// (a provider's receive loop, the ticker, or a caller of a manager method).
/// Never called for a cancelled request. Implementations must not block.
///
/// Any `FnOnce(RequestId, AssetOutcome) + Send` closure is a delivery target.
pub trait DeliveryTarget: Send + 'static {
    /// Hand over the outcome
    fn deliver(self: Box<Self>, request: RequestId, outcome: AssetOutcome);
}

impl<F> DeliveryTarget for F
where
    F: FnOnce(RequestId, AssetOutcome) + Send + 'static,
{
    fn deliver(self: Box<Self>, request: RequestId, outcome: AssetOutcome) {
        (*self)(request, outcome)
    }
}

/// Deliver `outcome` to every waiter in attach order; returns the number notified
///
/// Must be called after the transfer has been removed from the table and
/// with the table lock released, so targets may call back into the manager.
pub(crate) fn fan_out(waiters: Vec<Waiter>, outcome: &AssetOutcome) -> usize {
    let final_state = match outcome {
        AssetOutcome::Completed(_) => RequestState::Completed,
        AssetOutcome::Failed(_) => RequestState::Failed,
    };

    let count = waiters.len();
    for waiter in waiters {
        waiter.state.send_replace(final_state);
        waiter.target.deliver(waiter.request, outcome.clone());
    }
    count
}
