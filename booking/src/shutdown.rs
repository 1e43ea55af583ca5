use tokio::sync::watch;

/// Cooperative cancellation signal.
///
/// Triggering it stops the dispatcher from enqueueing more requests and makes
/// workers exit at their next queue check. Requests already taken by a worker
/// still complete.
#[derive(Clone, Debug)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    /// Returns the signal together with its trigger. Send `true` to cancel.
    pub fn new() -> (Self, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { rx }, tx)
    }

    /// A signal that can never fire.
    pub fn never() -> Self {
        let (shutdown, _tx) = Self::new();
        shutdown
    }

    pub fn is_triggered(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Never resolves if the trigger
    /// was dropped without firing.
    pub async fn triggered(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl From<watch::Receiver<bool>> for Shutdown {
    fn from(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }
}
