use tokio::sync::watch;

/// Fires the paired [`AbortSignal`]s.
#[derive(Debug)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

/// Cloneable, level-triggered abort flag observed by watchers and sessions.
///
/// Once fired it stays fired. A signal whose handle has been dropped without
/// firing never fires.
#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle { tx }, AbortSignal { rx })
}

impl AbortHandle {
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl AbortSignal {
    /// A signal that is never fired.
    pub fn never() -> Self {
        let (_, signal) = abort_pair();
        signal
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal has fired; pending forever otherwise.
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn abort_wakes_waiters() {
        let (handle, signal) = abort_pair();
        let waiter = tokio::spawn({
            let signal = signal.clone();
            async move { signal.aborted().await }
        });

        assert!(!signal.is_aborted());
        handle.abort();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(signal.is_aborted());
        assert!(handle.signal().is_aborted());
    }

    #[tokio::test]
    async fn never_signal_stays_pending() {
        let signal = AbortSignal::never();
        let res = tokio::time::timeout(Duration::from_millis(50), signal.aborted()).await;
        assert!(res.is_err());
        assert!(!signal.is_aborted());
    }
}
