//! Fixed-delay reconnection timer.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Holds at most one armed reconnection attempt.
///
/// Arming replaces any previous timer. The delay is fixed: a supervisory
/// client retries forever at a steady pace rather than backing off.
///
/// Each arming hands out a ticket. An attempt must redeem its ticket (under
/// the same lock that guards `cancel`) before acting, so an attempt that was
/// already running when the timer got cancelled or replaced does nothing.
#[derive(Default)]
pub(crate) struct ReconnectTimer {
    handle: Option<JoinHandle<()>>,
    ticket: u64,
}

impl ReconnectTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the attempt built by `attempt` after `delay`, cancelling any
    /// previously armed one. The attempt receives its ticket.
    pub fn arm<F, Fut>(&mut self, delay: Duration, attempt: F)
    where
        F: FnOnce(u64) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let attempt = attempt(self.ticket);
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            attempt.await;
        }));
    }

    pub fn cancel(&mut self) {
        self.ticket = self.ticket.wrapping_add(1);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Consume the armed ticket. Returns false if the timer was cancelled or
    /// re-armed since `ticket` was issued.
    pub fn redeem(&mut self, ticket: u64) -> bool {
        if ticket != self.ticket || self.handle.is_none() {
            return false;
        }
        self.handle = None;
        self.ticket = self.ticket.wrapping_add(1);
        true
    }

    #[cfg(test)]
    pub fn is_armed(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ReconnectTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
