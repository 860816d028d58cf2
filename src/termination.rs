use tokio::sync::watch;

/// A flag that is set once and can be awaited, e.g. 'the operation reached a terminal state' or
///  'the transport was closed'
pub struct Termination {
    terminated: watch::Sender<bool>,
}

impl Termination {
    pub fn new() -> Termination {
        Termination {
            terminated: watch::Sender::new(false),
        }
    }

    /// Returns `true` for the call that actually changed the state
    pub fn terminate(&self) -> bool {
        self.terminated.send_if_modified(|terminated| {
            if *terminated {
                false
            }
            else {
                *terminated = true;
                true
            }
        })
    }

    pub fn is_terminated(&self) -> bool {
        *self.terminated.borrow()
    }

    pub async fn wait(&self) {
        let mut rx = self.terminated.subscribe();
        // the sender lives in self, so the channel can not be closed while we wait
        let _ = rx.wait_for(|terminated| *terminated).await;
    }
}

impl Default for Termination {
    fn default() -> Self {
        Termination::new()
    }
}
