use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use bytes::Bytes;
use tokio::select;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, trace};
use crate::connection::FrameSender;
use crate::error::RSocketError;
use crate::frame::Frame;

/// Liveness of a connection: sends KEEPALIVE frames every `interval` and fails the connection if
///  no KEEPALIVE was received for `max_lifetime`.
pub struct KeepAlive {
    interval: Duration,
    max_lifetime: Duration,
    last_received: Mutex<Instant>,
    awaiting_reply: AtomicBool,
}

impl KeepAlive {
    pub fn new(interval: Duration, max_lifetime: Duration) -> KeepAlive {
        KeepAlive {
            interval,
            max_lifetime,
            last_received: Mutex::new(Instant::now()),
            awaiting_reply: AtomicBool::new(false),
        }
    }

    /// To be called for every received KEEPALIVE frame. `respond` is the frame's flag: a frame
    ///  without it is the reply to one of ours.
    pub fn received(&self, respond: bool) {
        *self.last_received.lock().unwrap() = Instant::now();
        if !respond {
            self.awaiting_reply.store(false, Ordering::Release);
        }
    }

    fn is_expired(&self) -> bool {
        self.last_received.lock().unwrap().elapsed() >= self.max_lifetime
    }

    fn deadline(&self) -> Instant {
        *self.last_received.lock().unwrap() + self.max_lifetime
    }

    /// Runs until the connection is found dead or sending fails, returning the cause
    pub async fn run(&self, sender: &FrameSender) -> RSocketError {
        let mut ticks = time::interval_at(Instant::now() + self.interval, self.interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            select! {
                _ = ticks.tick() => {
                    if self.awaiting_reply.swap(true, Ordering::AcqRel) {
                        trace!("keep-alive reply is pending, skipping tick");
                        continue;
                    }
                    debug!("sending keep-alive");
                    if let Err(e) = sender.send_frame(Frame::keep_alive(true, Bytes::new())).await {
                        return e;
                    }
                }
                _ = time::sleep_until(self.deadline()) => {
                    // a keep-alive may have been received while we were waiting
                    if self.is_expired() {
                        debug!("no keep-alive received for {:?}", self.max_lifetime);
                        return RSocketError::ConnectionError(format!("no keep-alive received for {}ms", self.max_lifetime.as_millis()));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use crate::buffer_pool::BufferPool;
    use crate::connection::prioritizer::{prioritizer, PrioritizerQueue};
    use super::*;

    fn sender() -> (FrameSender, PrioritizerQueue) {
        let (prioritizer, queue) = prioritizer(16);
        (FrameSender::new(prioritizer, Arc::new(BufferPool::new(64, 4)), 0), queue)
    }

    fn sent_frames(queue: &mut PrioritizerQueue) -> Vec<Frame> {
        let mut result = Vec::new();
        while let Some(buf) = queue.try_dequeue_frame() {
            result.push(Frame::deser(&mut buf.freeze()).unwrap());
        }
        result
    }

    #[tokio::test(start_paused = true)]
    async fn test_sends_keep_alive_per_interval() {
        let (sender, mut queue) = sender();
        let keep_alive = Arc::new(KeepAlive::new(Duration::from_millis(100), Duration::from_secs(10)));

        let ka2 = keep_alive.clone();
        let task = tokio::spawn(async move { ka2.run(&sender).await });

        time::sleep(Duration::from_millis(50)).await;
        assert!(sent_frames(&mut queue).is_empty());

        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sent_frames(&mut queue), vec![Frame::keep_alive(true, Bytes::new())]);

        // no reply yet: the next tick is skipped
        time::sleep(Duration::from_millis(100)).await;
        assert!(sent_frames(&mut queue).is_empty());

        keep_alive.received(false);
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(sent_frames(&mut queue), vec![Frame::keep_alive(true, Bytes::new())]);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let (sender, _queue) = sender();
        let keep_alive = KeepAlive::new(Duration::from_millis(50), Duration::from_millis(200));

        let start = Instant::now();
        let cause = keep_alive.run(&sender).await;

        assert_eq!(cause, RSocketError::ConnectionError("no keep-alive received for 200ms".to_string()));
        assert_eq!(start.elapsed(), Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_received_extends_lifetime() {
        let (sender, _queue) = sender();
        let keep_alive = Arc::new(KeepAlive::new(Duration::from_millis(50), Duration::from_millis(200)));

        let ka2 = keep_alive.clone();
        let start = Instant::now();
        let task = tokio::spawn(async move { ka2.run(&sender).await });

        time::sleep(Duration::from_millis(150)).await;
        // a keep-alive request from the peer counts as well
        keep_alive.received(true);

        task.await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(350));
    }

    #[tokio::test]
    async fn test_send_failure() {
        let (sender, mut queue) = sender();
        queue.close();

        let keep_alive = KeepAlive::new(Duration::from_millis(1), Duration::from_secs(10));
        assert_eq!(keep_alive.run(&sender).await, RSocketError::connection_closed());
    }
}
