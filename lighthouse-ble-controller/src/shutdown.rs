//! Cooperative cancellation shared by retry loops, sessions and the scanner

use std::sync::Arc;

use tokio::sync::watch;

/// Triggers a [`Shutdown`]. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Observes a shutdown request
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: Option<watch::Receiver<bool>>,
}

pub fn channel() -> (ShutdownHandle, Shutdown) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx: Arc::new(tx) }, Shutdown { rx: Some(rx) })
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> Shutdown {
        Shutdown { rx: Some(self.tx.subscribe()) }
    }
}

impl Shutdown {
    /// A shutdown that never fires
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_triggered(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once the shutdown is triggered, never if the handle is gone
    pub async fn triggered(&mut self) {
        match self.rx.as_mut() {
            Some(rx) => {
                if rx.wait_for(|triggered| *triggered).await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
            None => std::future::pending::<()>().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_wakes_every_subscriber() {
        let (handle, mut first) = channel();
        let mut second = handle.subscribe();
        assert!(!first.is_triggered());

        handle.trigger();
        first.triggered().await;
        second.triggered().await;
        assert!(second.is_triggered());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_handle_never_fires() {
        let (handle, mut shutdown) = channel();
        drop(handle);
        let fired = tokio::time::timeout(Duration::from_secs(60), shutdown.triggered()).await;
        assert!(fired.is_err());
        assert!(!Shutdown::never().is_triggered());
    }
}
