use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::internal::common::Map;
use crate::internal::common::error::PoolError;

pub const DEFAULT_RENEWAL_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Serialized tokens per service name.
pub type TokenBundle = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenManagerConfiguration {
    /// Providers not listed here are enabled.
    pub provider_enabled: Map<String, bool>,
    pub renewal_interval: Duration,
}

impl Default for TokenManagerConfiguration {
    fn default() -> Self {
        TokenManagerConfiguration {
            provider_enabled: Default::default(),
            renewal_interval: DEFAULT_RENEWAL_INTERVAL,
        }
    }
}

impl TokenManagerConfiguration {
    pub fn is_provider_enabled(&self, service_name: &str) -> bool {
        self.provider_enabled
            .get(service_name)
            .copied()
            .unwrap_or(true)
    }

    pub fn with_provider(mut self, service_name: &str, enabled: bool) -> Self {
        self.provider_enabled
            .insert(service_name.to_string(), enabled);
        self
    }
}

pub trait DelegationTokenProvider: Send {
    fn service_name(&self) -> &str;

    fn init(&mut self, config: &TokenManagerConfiguration) -> crate::Result<()>;

    fn delegation_tokens_required(&self) -> bool {
        true
    }

    /// Stores the tokens into `tokens` and returns for how long they stay valid.
    fn obtain_delegation_tokens(&self, tokens: &mut TokenBundle) -> crate::Result<Option<Duration>>;
}

/// Login state of the process (e.g. a Kerberos ticket).
pub trait CredentialSource: Send + Sync {
    fn is_from_keytab(&self) -> bool;

    fn relogin_from_keytab(&self) -> crate::Result<()>;
}

/// Shared "is authentication still valid" flag.
#[derive(Debug, Clone)]
pub struct AuthenticationStatus {
    valid: Arc<AtomicBool>,
}

impl Default for AuthenticationStatus {
    fn default() -> Self {
        AuthenticationStatus {
            valid: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl AuthenticationStatus {
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    pub(crate) fn set_valid(&self, valid: bool) {
        self.valid.store(valid, Ordering::Release);
    }
}

#[derive(Debug, Default)]
pub struct ObtainedTokens {
    pub tokens: TokenBundle,
    /// The shortest validity reported by the providers.
    pub valid_for: Option<Duration>,
}

pub struct DelegationTokenManager {
    config: TokenManagerConfiguration,
    providers: Vec<Box<dyn DelegationTokenProvider>>,
    credentials: Arc<dyn CredentialSource>,
    status: AuthenticationStatus,
    renewal_task: Option<JoinHandle<()>>,
}

impl DelegationTokenManager {
    /// Loads every enabled provider. Fails if any of them cannot be initialized.
    pub fn new(
        config: TokenManagerConfiguration,
        providers: Vec<Box<dyn DelegationTokenProvider>>,
        credentials: Arc<dyn CredentialSource>,
    ) -> crate::Result<Self> {
        if config.renewal_interval.is_zero() {
            return Err(PoolError::ConfigurationError(
                "renewal interval must be positive".to_string(),
            ));
        }
        let mut loaded = Vec::with_capacity(providers.len());
        for mut provider in providers {
            let name = provider.service_name().to_string();
            if !config.is_provider_enabled(&name) {
                log::debug!("Delegation token provider {name} is disabled");
                continue;
            }
            provider.init(&config).map_err(|e| {
                PoolError::TokenError(format!("provider {name} failed to initialize: {e}"))
            })?;
            log::debug!("Delegation token provider {name} loaded");
            loaded.push(provider);
        }
        Ok(DelegationTokenManager {
            config,
            providers: loaded,
            credentials,
            status: AuthenticationStatus::default(),
            renewal_task: None,
        })
    }

    pub fn is_provider_enabled(&self, service_name: &str) -> bool {
        self.config.is_provider_enabled(service_name)
    }

    pub fn is_provider_loaded(&self, service_name: &str) -> bool {
        self.providers
            .iter()
            .any(|p| p.service_name() == service_name)
    }

    pub fn obtain_delegation_tokens(&self) -> crate::Result<ObtainedTokens> {
        let mut result = ObtainedTokens::default();
        for provider in &self.providers {
            if !provider.delegation_tokens_required() {
                continue;
            }
            let valid_for = provider
                .obtain_delegation_tokens(&mut result.tokens)
                .map_err(|e| {
                    PoolError::TokenError(format!(
                        "provider {} failed to obtain tokens: {e}",
                        provider.service_name()
                    ))
                })?;
            result.valid_for = match (result.valid_for, valid_for) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
        }
        Ok(result)
    }

    pub fn authentication_status(&self) -> AuthenticationStatus {
        self.status.clone()
    }

    pub fn renew_now(&self) -> crate::Result<()> {
        renew_credentials(self.credentials.as_ref(), &self.status)
    }

    /// Starts periodic renewal; does nothing unless the credentials come from a keytab.
    pub fn start_tgt_renewal(&mut self) {
        if !self.credentials.is_from_keytab() {
            log::debug!("Credentials do not come from a keytab, no renewal scheduled");
            return;
        }
        if self.renewal_task.is_some() {
            return;
        }
        let credentials = self.credentials.clone();
        let status = self.status.clone();
        let period = self.config.renewal_interval;
        log::info!("Starting credential renewal every {period:?}");
        self.renewal_task = Some(tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            loop {
                interval.tick().await;
                let _ = renew_credentials(credentials.as_ref(), &status);
            }
        }));
    }

    pub fn stop_tgt_renewal(&mut self) {
        if let Some(task) = self.renewal_task.take() {
            log::debug!("Stopping credential renewal");
            task.abort();
        }
    }

    pub fn is_renewal_running(&self) -> bool {
        self.renewal_task.is_some()
    }
}

impl Drop for DelegationTokenManager {
    fn drop(&mut self) {
        self.stop_tgt_renewal();
    }
}

fn renew_credentials(
    credentials: &dyn CredentialSource,
    status: &AuthenticationStatus,
) -> crate::Result<()> {
    if !credentials.is_from_keytab() {
        return Ok(());
    }
    match credentials.relogin_from_keytab() {
        Ok(()) => {
            log::debug!("Credentials renewed");
            status.set_valid(true);
            Ok(())
        }
        Err(e) => {
            log::warn!("Credential renewal failed: {e}");
            status.set_valid(false);
            Err(PoolError::TokenError(format!("renewal failed: {e}")))
        }
    }
}
