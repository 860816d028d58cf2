use std::sync::atomic::{AtomicU32, Ordering};
use anyhow::bail;
use tokio::sync::Notify;
use tracing::trace;

/// The maximum credit a stream can accumulate. REQUEST_N values add up and saturate here, which
///  effectively means 'unbounded'.
pub const MAX_CREDIT: u32 = i32::MAX as u32;

/// Credit for emitting items on a stream, granted by the peer through the initial request count
///  and REQUEST_N frames. The producer takes one unit of credit per item, waiting if there is none.
///
/// There is a single producer per limiter, while credit can be added from any task.
pub struct Limiter {
    credit: AtomicU32,
    credit_added: Notify,
}

impl Limiter {
    pub fn new(initial_credit: u32) -> Limiter {
        Limiter {
            credit: AtomicU32::new(initial_credit.min(MAX_CREDIT)),
            credit_added: Notify::new(),
        }
    }

    pub fn update_requests(&self, n: u32) {
        if n == 0 {
            return;
        }

        let _ = self.credit.fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| Some(cur.saturating_add(n).min(MAX_CREDIT)));
        trace!("added {} credits", n);
        self.credit_added.notify_one();
    }

    pub fn credit(&self) -> u32 {
        self.credit.load(Ordering::Acquire)
    }

    pub fn try_use_request(&self) -> bool {
        self.credit.fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| cur.checked_sub(1))
            .is_ok()
    }

    /// Takes one unit of credit, waiting for the peer to grant more if there is none left
    pub async fn use_request(&self) {
        loop {
            if self.try_use_request() {
                return;
            }
            trace!("waiting for credit");
            // notify_one stores a permit if credit was added between the check and this point
            self.credit_added.notified().await;
        }
    }
}

/// How a requester asks its peer for items of a stream: prefetch `request_size` items, and top up
///  whenever the number of requested but not yet consumed items drops to `request_on`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestStrategy {
    pub request_size: u32,
    pub request_on: u32,
}

impl RequestStrategy {
    pub fn prefetch(request_size: u32, request_on: u32) -> RequestStrategy {
        RequestStrategy { request_size, request_on }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.request_size == 0 {
            bail!("request size must be positive");
        }
        if self.request_on >= self.request_size {
            bail!("request threshold {} must be smaller than the request size {}", self.request_on, self.request_size);
        }
        Ok(())
    }

    pub fn demand(&self) -> Demand {
        Demand {
            strategy: *self,
            outstanding: 0,
        }
    }
}

impl Default for RequestStrategy {
    fn default() -> Self {
        RequestStrategy::prefetch(64, 16)
    }
}

/// The consumer side state of a [RequestStrategy] for a single stream
#[derive(Debug)]
pub struct Demand {
    strategy: RequestStrategy,
    outstanding: u32,
}

impl Demand {
    pub fn first_request(&mut self) -> u32 {
        self.outstanding = self.strategy.request_size;
        self.outstanding
    }

    /// Called for each consumed item, returns the number of items to request from the peer (or 0)
    pub fn next_request(&mut self) -> u32 {
        self.outstanding = self.outstanding.saturating_sub(1);
        if self.outstanding > self.strategy.request_on {
            return 0;
        }

        let n = self.strategy.request_size - self.outstanding;
        self.outstanding = self.strategy.request_size;
        n
    }
}
