//! Rendezvous hand-off between the poll and store loops.
//!
//! `send` completes only once the receiver has taken the value, so a busy
//! receiver stalls the sender. Nothing is ever buffered beyond the one value
//! in transit.

use crate::core::{PromLightError, Result};
use tokio::sync::{mpsc, oneshot};

type Envelope<T> = (T, oneshot::Sender<()>);

/// Create a connected sender/receiver pair.
pub fn channel<T>() -> (HandoffSender<T>, HandoffReceiver<T>) {
    let (tx, rx) = mpsc::channel(1);
    (HandoffSender { tx }, HandoffReceiver { rx })
}

/// Sending half.
#[derive(Debug)]
pub struct HandoffSender<T> {
    tx: mpsc::Sender<Envelope<T>>,
}

impl<T> HandoffSender<T> {
    /// Hand `value` over, waiting until the receiver has taken it.
    ///
    /// If the future is dropped after the value was queued, the value may
    /// still be delivered.
    pub async fn send(&self, value: T) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send((value, ack_tx))
            .await
            .map_err(|_| PromLightError::ChannelClosed)?;
        ack_rx.await.map_err(|_| PromLightError::ChannelClosed)
    }
}

/// Receiving half.
#[derive(Debug)]
pub struct HandoffReceiver<T> {
    rx: mpsc::Receiver<Envelope<T>>,
}

impl<T> HandoffReceiver<T> {
    /// Take the next value, releasing its sender. `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<T> {
        let (value, ack) = self.rx.recv().await?;
        // The sender may have given up waiting, the value is still good.
        let _ = ack.send(());
        Some(value)
    }
}
