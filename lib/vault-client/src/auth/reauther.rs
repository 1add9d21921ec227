use super::{Auther, ExponentialBackoff};
use crate::config::ReAutherConfig;
use crate::VaultError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// One-shot "authenticated" signal published by a [`ReAuther`].
#[derive(Clone)]
pub struct LoggedIn(watch::Receiver<bool>);

impl LoggedIn {
    pub fn is_logged_in(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once the first login succeeded. Returns `false` if the
    /// re-auth loop stopped before that happened.
    pub async fn wait(&self) -> bool {
        let mut rx = self.0.clone();
        rx.wait_for(|logged_in| *logged_in).await.is_ok()
    }
}

/// Background task keeping an [`Auther`] logged in.
///
/// Logs in (retrying with backoff), renews at half of the remaining lease and
/// falls back to a fresh login once the lease ran out, the token reached
/// `max_ttl`, or the server refused renewal.
pub struct ReAuther {
    logged_in: LoggedIn,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl ReAuther {
    pub fn spawn(auther: Arc<dyn Auther>, config: ReAutherConfig) -> Self {
        let (tx, rx) = watch::channel(false);
        let cancel = CancellationToken::new();

        let lifecycle = Lifecycle {
            backoff: ExponentialBackoff::new(
                config.retry_initial,
                config.retry_max,
                config.retry_max_elapsed,
            ),
            auther,
            max_ttl: config.max_ttl,
            lease_end: None,
            token_eol: None,
            logged_in: tx,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(lifecycle.run());

        Self {
            logged_in: LoggedIn(rx),
            cancel,
            handle: Some(handle),
        }
    }

    pub fn logged_in(&self) -> LoggedIn {
        self.logged_in.clone()
    }

    /// Cancels the loop and waits for it to exit.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "re-auth task ended abnormally");
            }
        }
    }
}

impl Drop for ReAuther {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Lifecycle {
    auther: Arc<dyn Auther>,
    backoff: ExponentialBackoff,
    max_ttl: Duration,
    lease_end: Option<Instant>,
    token_eol: Option<Instant>,
    logged_in: watch::Sender<bool>,
    cancel: CancellationToken,
}

impl Lifecycle {
    async fn run(mut self) {
        loop {
            if !self.login().await {
                break;
            }
            let wake = self.next_wake();
            if !self.sleep_until(wake).await {
                break;
            }
            if !self.renew_while_valid().await {
                break;
            }
        }
        tracing::debug!("re-auth loop stopped");
    }

    /// Logs in, retrying forever. `false` means cancelled.
    async fn login(&mut self) -> bool {
        loop {
            let auther = self.auther.clone();
            let Some(result) = self.cancellable(auther.login()).await else {
                return false;
            };
            match result {
                Ok(lease) => {
                    let now = Instant::now();
                    self.backoff.reset();
                    self.token_eol = (!self.max_ttl.is_zero()).then(|| now + self.max_ttl);
                    self.lease_end = lease_end(now, lease);
                    self.logged_in.send_if_modified(|logged_in| !std::mem::replace(logged_in, true));
                    tracing::debug!(lease_secs = lease.as_secs(), "logged in");
                    return true;
                }
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    tracing::error!(error = %e, retry_in = ?delay, "login failed");
                    if !self.sleep_for(delay).await {
                        return false;
                    }
                }
            }
        }
    }

    /// Renews until the token must be replaced. `false` means cancelled.
    async fn renew_while_valid(&mut self) -> bool {
        while self.renewable() {
            let auther = self.auther.clone();
            let Some(result) = self.cancellable(auther.renew()).await else {
                return false;
            };
            match result {
                Ok(lease) => {
                    self.backoff.reset();
                    self.lease_end = lease_end(Instant::now(), lease);
                    tracing::debug!(lease_secs = lease.as_secs(), "renewed");
                    let wake = self.next_wake();
                    if !self.sleep_until(wake).await {
                        return false;
                    }
                }
                Err(VaultError::NotRenewable) => {
                    tracing::info!("lease is not renewable; waiting for it to expire");
                    let expiry = match (self.lease_end, self.token_eol) {
                        (Some(end), Some(eol)) => Some(end.min(eol)),
                        (end, eol) => end.or(eol),
                    };
                    return self.sleep_until(expiry).await;
                }
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    tracing::error!(error = %e, retry_in = ?delay, "renew failed");
                    if !self.sleep_for(delay).await {
                        return false;
                    }
                }
            }
        }
        true
    }

    fn renewable(&self) -> bool {
        let now = Instant::now();
        let past = |deadline: Option<Instant>| deadline.is_some_and(|d| now >= d);
        !(past(self.token_eol) || past(self.lease_end))
    }

    /// `None` means there is nothing to do until cancelled.
    fn next_wake(&self) -> Option<Instant> {
        if let Some(eol) = self.token_eol {
            if self.lease_end.is_none_or(|end| end > eol) {
                return Some(eol);
            }
        }
        let now = Instant::now();
        self.lease_end
            .map(|end| now + end.saturating_duration_since(now) / 2)
    }

    /// `None` when cancelled before `fut` completed.
    async fn cancellable<T>(&self, fut: impl Future<Output = T>) -> Option<T> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            out = fut => Some(out),
        }
    }

    async fn sleep_for(&self, delay: Duration) -> bool {
        self.sleep_until(Some(Instant::now() + delay)).await
    }

    async fn sleep_until(&self, deadline: Option<Instant>) -> bool {
        match deadline {
            Some(deadline) => tokio::select! {
                _ = self.cancel.cancelled() => false,
                _ = tokio::time::sleep_until(deadline) => true,
            },
            None => {
                self.cancel.cancelled().await;
                false
            }
        }
    }
}

fn lease_end(now: Instant, lease: Duration) -> Option<Instant> {
    (!lease.is_zero()).then(|| now + lease)
}
