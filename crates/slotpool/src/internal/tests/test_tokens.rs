use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::PoolError;
use crate::internal::security::tokens::{
    CredentialSource, DelegationTokenManager, DelegationTokenProvider, TokenBundle,
    TokenManagerConfiguration,
};

struct TestProvider {
    name: String,
    valid_for: Option<Duration>,
    required: bool,
    fail_init: bool,
    initialized: bool,
}

impl TestProvider {
    fn new(name: &str, valid_for: Option<Duration>) -> TestProvider {
        TestProvider {
            name: name.to_string(),
            valid_for,
            required: true,
            fail_init: false,
            initialized: false,
        }
    }
}

fn providers(list: Vec<TestProvider>) -> Vec<Box<dyn DelegationTokenProvider>> {
    list.into_iter()
        .map(|p| Box::new(p) as Box<dyn DelegationTokenProvider>)
        .collect()
}

impl DelegationTokenProvider for TestProvider {
    fn service_name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, _config: &TokenManagerConfiguration) -> crate::Result<()> {
        if self.fail_init {
            return Err("cannot reach the token service".into());
        }
        self.initialized = true;
        Ok(())
    }

    fn delegation_tokens_required(&self) -> bool {
        self.required
    }

    fn obtain_delegation_tokens(
        &self,
        tokens: &mut TokenBundle,
    ) -> crate::Result<Option<Duration>> {
        assert!(self.initialized);
        tokens.insert(self.name.clone(), self.name.as_bytes().to_vec());
        Ok(self.valid_for)
    }
}

#[derive(Default)]
struct TestCredentials {
    from_keytab: bool,
    failing: AtomicBool,
    renewals: AtomicUsize,
}

impl TestCredentials {
    fn keytab() -> Arc<TestCredentials> {
        Arc::new(TestCredentials {
            from_keytab: true,
            ..Default::default()
        })
    }

    fn renewals(&self) -> usize {
        self.renewals.load(Ordering::SeqCst)
    }
}

impl CredentialSource for TestCredentials {
    fn is_from_keytab(&self) -> bool {
        self.from_keytab
    }

    fn relogin_from_keytab(&self) -> crate::Result<()> {
        self.renewals.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            Err("KDC unreachable".into())
        } else {
            Ok(())
        }
    }
}

fn config(interval: Duration) -> TokenManagerConfiguration {
    TokenManagerConfiguration {
        renewal_interval: interval,
        ..Default::default()
    }
}

#[test]
fn test_disabled_provider_is_not_loaded() {
    let config = TokenManagerConfiguration::default().with_provider("hbase", false);
    let manager = DelegationTokenManager::new(
        config,
        providers(vec![
            TestProvider::new("hdfs", None),
            TestProvider::new("hbase", None),
        ]),
        Arc::new(TestCredentials::default()),
    )
    .unwrap();
    assert!(manager.is_provider_enabled("hdfs"));
    assert!(!manager.is_provider_enabled("hbase"));
    assert!(manager.is_provider_loaded("hdfs"));
    assert!(!manager.is_provider_loaded("hbase"));

    let obtained = manager.obtain_delegation_tokens().unwrap();
    assert_eq!(obtained.tokens.keys().collect::<Vec<_>>(), vec!["hdfs"]);
}

#[test]
fn test_failing_provider_fails_construction() {
    let mut broken = TestProvider::new("hive", None);
    broken.fail_init = true;
    let result = DelegationTokenManager::new(
        TokenManagerConfiguration::default(),
        providers(vec![TestProvider::new("hdfs", None), broken]),
        Arc::new(TestCredentials::default()),
    );
    assert!(matches!(result, Err(PoolError::TokenError(_))));
}

#[test]
fn test_zero_renewal_interval_is_rejected() {
    let result = DelegationTokenManager::new(
        config(Duration::ZERO),
        Vec::new(),
        Arc::new(TestCredentials::default()),
    );
    assert!(matches!(result, Err(PoolError::ConfigurationError(_))));
}

#[test]
fn test_tokens_keep_shortest_validity() {
    let mut optional = TestProvider::new("kafka", Some(Duration::from_secs(1)));
    optional.required = false;
    let manager = DelegationTokenManager::new(
        TokenManagerConfiguration::default(),
        providers(vec![
            TestProvider::new("hdfs", Some(Duration::from_secs(600))),
            TestProvider::new("hbase", None),
            TestProvider::new("hive", Some(Duration::from_secs(60))),
            optional,
        ]),
        Arc::new(TestCredentials::default()),
    )
    .unwrap();
    let obtained = manager.obtain_delegation_tokens().unwrap();
    assert_eq!(
        obtained.tokens.keys().collect::<Vec<_>>(),
        vec!["hbase", "hdfs", "hive"]
    );
    assert_eq!(obtained.tokens["hdfs"], b"hdfs".to_vec());
    assert_eq!(obtained.valid_for, Some(Duration::from_secs(60)));
}

#[test]
fn test_no_validity_reported() {
    let manager = DelegationTokenManager::new(
        TokenManagerConfiguration::default(),
        providers(vec![TestProvider::new("hdfs", None)]),
        Arc::new(TestCredentials::default()),
    )
    .unwrap();
    assert_eq!(manager.obtain_delegation_tokens().unwrap().valid_for, None);
}

#[test]
fn test_failed_renewal_invalidates_status() {
    let credentials = TestCredentials::keytab();
    let manager = DelegationTokenManager::new(
        TokenManagerConfiguration::default(),
        Vec::new(),
        credentials.clone(),
    )
    .unwrap();
    let status = manager.authentication_status();
    assert!(status.is_valid());

    credentials.failing.store(true, Ordering::SeqCst);
    assert!(matches!(manager.renew_now(), Err(PoolError::TokenError(_))));
    assert!(!status.is_valid());

    credentials.failing.store(false, Ordering::SeqCst);
    manager.renew_now().unwrap();
    assert!(status.is_valid());
    assert_eq!(credentials.renewals(), 2);
}

#[test]
fn test_renew_without_keytab_is_noop() {
    let credentials = Arc::new(TestCredentials::default());
    let manager = DelegationTokenManager::new(
        TokenManagerConfiguration::default(),
        Vec::new(),
        credentials.clone(),
    )
    .unwrap();
    manager.renew_now().unwrap();
    assert_eq!(credentials.renewals(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_periodic_renewal() {
    let credentials = TestCredentials::keytab();
    let mut manager = DelegationTokenManager::new(
        config(Duration::from_secs(10)),
        Vec::new(),
        credentials.clone(),
    )
    .unwrap();
    manager.start_tgt_renewal();
    assert!(manager.is_renewal_running());

    // The first renewal happens one period after the start
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(credentials.renewals(), 0);
    tokio::time::sleep(Duration::from_secs(20)).await;
    assert_eq!(credentials.renewals(), 2);

    credentials.failing.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(credentials.renewals(), 3);
    assert!(!manager.authentication_status().is_valid());

    manager.stop_tgt_renewal();
    assert!(!manager.is_renewal_running());
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(credentials.renewals(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_renewal_requires_keytab() {
    let credentials = Arc::new(TestCredentials::default());
    let mut manager = DelegationTokenManager::new(
        config(Duration::from_secs(10)),
        Vec::new(),
        credentials.clone(),
    )
    .unwrap();
    manager.start_tgt_renewal();
    assert!(!manager.is_renewal_running());
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(credentials.renewals(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_dropping_manager_stops_renewal() {
    let credentials = TestCredentials::keytab();
    let mut manager = DelegationTokenManager::new(
        config(Duration::from_secs(10)),
        Vec::new(),
        credentials.clone(),
    )
    .unwrap();
    manager.start_tgt_renewal();
    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(credentials.renewals(), 1);
    drop(manager);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(credentials.renewals(), 1);
}
