// lib/vault-client/tests/integration_reauther.rs

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use vault_client::{Auther, ReAuther, ReAutherConfig, VaultError};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Call {
    Login,
    Renew,
}

/// Scripted auther. Unscripted calls succeed with the default lease.
struct FakeAuther {
    started: Instant,
    lease: Duration,
    logins: Mutex<VecDeque<Result<Duration, VaultError>>>,
    renewals: Mutex<VecDeque<Result<Duration, VaultError>>>,
    calls: Mutex<Vec<(Call, Duration)>>,
}

impl FakeAuther {
    fn new(lease: Duration) -> Self {
        Self {
            started: Instant::now(),
            lease,
            logins: Mutex::new(VecDeque::new()),
            renewals: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn script_logins(self, results: Vec<Result<Duration, VaultError>>) -> Self {
        *self.logins.lock().unwrap() = results.into();
        self
    }

    fn script_renewals(self, results: Vec<Result<Duration, VaultError>>) -> Self {
        *self.renewals.lock().unwrap() = results.into();
        self
    }

    fn calls(&self) -> Vec<(Call, Duration)> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls
            .lock()
            .unwrap()
            .push((call, self.started.elapsed()));
    }
}

#[async_trait]
impl Auther for FakeAuther {
    async fn login(&self) -> Result<Duration, VaultError> {
        self.record(Call::Login);
        self.logins
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(self.lease))
    }

    async fn renew(&self) -> Result<Duration, VaultError> {
        self.record(Call::Renew);
        self.renewals
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(self.lease))
    }
}

fn config(max_ttl: Duration) -> ReAutherConfig {
    ReAutherConfig {
        max_ttl,
        ..ReAutherConfig::default()
    }
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

#[tokio::test(start_paused = true)]
async fn test_first_renew_at_half_lease() {
    let auther = Arc::new(FakeAuther::new(secs(10)));
    let mut reauther = ReAuther::spawn(auther.clone(), config(Duration::ZERO));

    tokio::time::sleep(Duration::from_millis(4900)).await;
    assert_eq!(auther.calls(), vec![(Call::Login, Duration::ZERO)]);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        auther.calls(),
        vec![(Call::Login, Duration::ZERO), (Call::Renew, secs(5))]
    );

    reauther.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_max_ttl_forces_login() {
    let auther = Arc::new(FakeAuther::new(secs(3600)));
    let mut reauther = ReAuther::spawn(auther.clone(), config(secs(10)));

    tokio::time::sleep(Duration::from_millis(10_500)).await;
    assert_eq!(
        auther.calls(),
        vec![(Call::Login, Duration::ZERO), (Call::Login, secs(10))]
    );

    reauther.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_login_retries_until_backend_recovers() {
    let auther = Arc::new(FakeAuther::new(secs(60)).script_logins(vec![
        Err(VaultError::RequestError("connection refused".into())),
        Err(VaultError::ClientError { status: 503, message: "sealed".into() }),
        Err(VaultError::AuthError("permission denied".into())),
    ]));
    let mut reauther = ReAuther::spawn(auther.clone(), ReAutherConfig::default());
    let logged_in = reauther.logged_in();
    assert!(!logged_in.is_logged_in());

    assert!(logged_in.wait().await);

    // Backoff: 1s, 1.5s, 2.25s.
    let logins: Vec<Duration> = auther
        .calls()
        .into_iter()
        .filter(|(call, _)| *call == Call::Login)
        .map(|(_, at)| at)
        .collect();
    assert_eq!(
        logins,
        vec![
            Duration::ZERO,
            secs(1),
            Duration::from_millis(2500),
            Duration::from_millis(4750)
        ]
    );

    reauther.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_renew_failure_keeps_retrying() {
    let auther = Arc::new(FakeAuther::new(secs(60)).script_renewals(vec![
        Err(VaultError::RequestError("timeout".into())),
        Err(VaultError::RequestError("timeout".into())),
    ]));
    let mut reauther = ReAuther::spawn(auther.clone(), ReAutherConfig::default());

    tokio::time::sleep(secs(35)).await;
    assert_eq!(
        auther.calls(),
        vec![
            (Call::Login, Duration::ZERO),
            (Call::Renew, secs(30)),
            (Call::Renew, secs(31)),
            (Call::Renew, Duration::from_millis(32_500)),
        ]
    );

    reauther.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_not_renewable_waits_for_expiry_then_logs_in() {
    let auther = Arc::new(
        FakeAuther::new(secs(10)).script_renewals(vec![Err(VaultError::NotRenewable)]),
    );
    let mut reauther = ReAuther::spawn(auther.clone(), config(Duration::ZERO));

    tokio::time::sleep(Duration::from_millis(10_500)).await;
    assert_eq!(
        auther.calls(),
        vec![
            (Call::Login, Duration::ZERO),
            (Call::Renew, secs(5)),
            (Call::Login, secs(10)),
        ]
    );

    reauther.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_token_without_lease_is_left_alone() {
    let auther = Arc::new(FakeAuther::new(Duration::ZERO));
    let mut reauther = ReAuther::spawn(auther.clone(), config(Duration::ZERO));

    tokio::time::sleep(secs(3600)).await;
    assert_eq!(auther.calls(), vec![(Call::Login, Duration::ZERO)]);
    assert!(reauther.logged_in().is_logged_in());

    reauther.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_logged_in_signal_survives_relogin() {
    let auther = Arc::new(FakeAuther::new(secs(3600)));
    let mut reauther = ReAuther::spawn(auther.clone(), config(secs(10)));
    let logged_in = reauther.logged_in();

    assert!(logged_in.wait().await);
    tokio::time::sleep(secs(25)).await;

    assert_eq!(auther.calls().len(), 3);
    assert!(logged_in.is_logged_in());
    assert!(logged_in.wait().await);

    reauther.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_ends_the_loop() {
    let auther = Arc::new(FakeAuther::new(secs(10)));
    let mut reauther = ReAuther::spawn(auther.clone(), config(Duration::ZERO));

    tokio::time::sleep(secs(1)).await;
    reauther.stop().await;

    tokio::time::sleep(secs(60)).await;
    assert_eq!(auther.calls(), vec![(Call::Login, Duration::ZERO)]);
}

#[tokio::test(start_paused = true)]
async fn test_wait_reports_loop_stopped_before_login() {
    let auther = Arc::new(FakeAuther::new(secs(10)).script_logins(vec![
        Err(VaultError::RequestError("down".into())),
        Err(VaultError::RequestError("down".into())),
    ]));
    let mut reauther = ReAuther::spawn(auther.clone(), ReAutherConfig::default());
    let logged_in = reauther.logged_in();

    tokio::time::sleep(Duration::from_millis(500)).await;
    reauther.stop().await;

    assert!(!logged_in.wait().await);
}

/// Never answers, like a Vault server that accepts connections and stalls.
struct StalledAuther;

#[async_trait]
impl Auther for StalledAuther {
    async fn login(&self) -> Result<Duration, VaultError> {
        std::future::pending().await
    }

    async fn renew(&self) -> Result<Duration, VaultError> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn test_stop_interrupts_stalled_login() {
    let mut reauther = ReAuther::spawn(Arc::new(StalledAuther), ReAutherConfig::default());
    let logged_in = reauther.logged_in();

    tokio::time::sleep(secs(1)).await;
    let stopped = tokio::time::timeout(secs(3), reauther.stop()).await;

    assert!(stopped.is_ok());
    assert!(!logged_in.wait().await);
}

/// Logs in once, then stalls on every renewal.
struct StalledRenewal;

#[async_trait]
impl Auther for StalledRenewal {
    async fn login(&self) -> Result<Duration, VaultError> {
        Ok(secs(10))
    }

    async fn renew(&self) -> Result<Duration, VaultError> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn test_stop_interrupts_stalled_renewal() {
    let mut reauther = ReAuther::spawn(Arc::new(StalledRenewal), config(Duration::ZERO));

    // The first renewal starts at 5s and never returns.
    tokio::time::sleep(secs(6)).await;
    assert!(reauther.logged_in().is_logged_in());

    let stopped = tokio::time::timeout(secs(3), reauther.stop()).await;
    assert!(stopped.is_ok());
}
