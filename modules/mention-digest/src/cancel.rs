use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

use mention_digest_common::DigestError;

/// Run-wide cancellation. Cloned into every task; firing the handle makes
/// every in-flight guarded call return `Cancelled`.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// The firing side of a [`CancelSignal`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl CancelSignal {
    pub fn pair() -> (CancelHandle, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, CancelSignal { rx })
    }

    /// A signal nothing can fire.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the run is cancelled. Pends forever if the handle is
    /// dropped without firing.
    pub async fn cancelled(&self) {
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

/// Run one external call under the run's cancel signal and a per-call deadline.
pub async fn guarded<T, F>(
    cancel: &CancelSignal,
    limit: Duration,
    stage: &'static str,
    call: F,
) -> Result<T, DigestError>
where
    F: Future<Output = Result<T, DigestError>>,
{
    if cancel.is_cancelled() {
        return Err(DigestError::Cancelled);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(DigestError::Cancelled),
        res = tokio::time::timeout(limit, call) => match res {
            Ok(inner) => inner,
            Err(_) => Err(DigestError::Timeout { stage, limit }),
        },
    }
}
