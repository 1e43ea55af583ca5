//! Bounded request queue shared by every worker.
//!
//! tokio's `mpsc` receiver has a single owner, so workers share it behind an
//! async mutex. Whichever idle worker takes the lock first gets the next
//! request; FIFO order is kept from enqueue to hand-off.

use std::sync::Arc;

use tokio::sync::mpsc::error::SendError;
use tokio::sync::{Mutex, Semaphore, mpsc};

use crate::types::BookingRequest;

/// Producer side. Dropping the last sender closes the queue.
pub struct RequestSender {
    tx: mpsc::Sender<BookingRequest>,
}

/// Consumer side, cheap to clone (one clone per worker).
#[derive(Clone)]
pub struct RequestReceiver {
    rx: Arc<Mutex<mpsc::Receiver<BookingRequest>>>,
}

/// Creates a queue that holds up to `capacity` pending requests, clamped to
/// `1..=Semaphore::MAX_PERMITS`.
pub fn bounded(capacity: usize) -> (RequestSender, RequestReceiver) {
    let (tx, rx) = mpsc::channel(capacity.clamp(1, Semaphore::MAX_PERMITS));
    (
        RequestSender { tx },
        RequestReceiver {
            rx: Arc::new(Mutex::new(rx)),
        },
    )
}

impl RequestSender {
    /// Enqueues a request. Fails only when every receiver is gone.
    pub async fn send(&self, req: BookingRequest) -> Result<(), SendError<BookingRequest>> {
        self.tx.send(req).await
    }

    /// Free slots left in the buffer.
    pub fn remaining_capacity(&self) -> usize {
        self.tx.capacity()
    }
}

impl RequestReceiver {
    /// Next pending request, or `None` once the queue is closed and drained.
    pub async fn recv(&self) -> Option<BookingRequest> {
        self.rx.lock().await.recv().await
    }
}
