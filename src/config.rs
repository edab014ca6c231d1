//! Client configuration.
//!
//! A [`ClientConfig`] is built once through [`ClientConfigBuilder`] and stays
//! immutable for the life of a client. Defaults can be sourced from the
//! environment with [`ClientConfigBuilder::from_env`]:
//!
//! | variable | setting |
//! |---|---|
//! | `EVENTDBX_HOST` | host (`127.0.0.1`) |
//! | `EVENTDBX_PORT` | port (`6363`) |
//! | `EVENTDBX_TOKEN` | control token |
//! | `EVENTDBX_TENANT_ID` | tenant id |
//! | `EVENTDBX_VERBOSE` | verbose logging |
//! | `EVENTDBX_NO_NOISE` | refuse the Noise channel |
//! | `EVENTDBX_NOISE_PATTERN` | handshake pattern |
use std::{thread, time::Duration};

use log::debug;

use crate::{
    error::{ClientError, ClientResult},
    model::Endpoint,
    protocol::DEFAULT_NOISE_PATTERN,
};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 6363;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Exponential backoff with a ceiling. The first attempt is always immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(1, Duration::from_millis(50), Duration::from_millis(1000))
    }
}

impl RetryPolicy {
    /// `max_attempts` is raised to 1 and `max_delay` to `initial_delay` when
    /// configured lower.
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay: max_delay.max(initial_delay),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }

    /// Backoff before the given 1-indexed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 || self.initial_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(31);
        self.initial_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts run out. The closure receives the 1-indexed attempt number.
    pub fn run<T, F>(&self, mut op: F) -> ClientResult<T>
    where
        F: FnMut(u32) -> ClientResult<T>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    attempt += 1;
                    let delay = self.delay_for_attempt(attempt);
                    debug!("attempt {} failed ({e}); retrying in {delay:?}", attempt - 1);
                    thread::sleep(delay);
                }
                result => return result,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    host: String,
    port: u16,
    connect_timeout: Duration,
    request_timeout: Duration,
    token: String,
    tenant_id: String,
    verbose: bool,
    no_noise: bool,
    noise_pattern: String,
    retry_policy: RetryPolicy,
}

impl ClientConfig {
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            host: self.host.clone(),
            port: self.port,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn no_noise(&self) -> bool {
        self.no_noise
    }

    pub fn noise_pattern(&self) -> &str {
        &self.noise_pattern
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfigBuilder {
    host: String,
    port: u16,
    connect_timeout: Duration,
    request_timeout: Duration,
    token: String,
    tenant_id: String,
    verbose: bool,
    no_noise: bool,
    noise_pattern: String,
    retry_policy: RetryPolicy,
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientConfigBuilder {
    /// Builder with built-in defaults only; the environment is not consulted.
    pub fn new() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            token: String::new(),
            tenant_id: String::new(),
            verbose: false,
            no_noise: false,
            noise_pattern: DEFAULT_NOISE_PATTERN.to_string(),
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Builder seeded from the `EVENTDBX_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builder seeded from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::new();
        if let Some(host) = lookup("EVENTDBX_HOST").filter(|h| !h.trim().is_empty()) {
            builder.host = host.trim().to_string();
        }
        if let Some(port) = lookup("EVENTDBX_PORT")
            .and_then(|p| p.trim().parse::<u16>().ok())
            .filter(|p| *p != 0)
        {
            builder.port = port;
        }
        if let Some(token) = lookup("EVENTDBX_TOKEN") {
            builder = builder.token(&token);
        }
        if let Some(tenant) = lookup("EVENTDBX_TENANT_ID") {
            builder = builder.tenant_id(&tenant);
        }
        builder.verbose = lookup("EVENTDBX_VERBOSE").is_some_and(|v| truthy(&v));
        builder.no_noise = lookup("EVENTDBX_NO_NOISE").is_some_and(|v| truthy(&v));
        if let Some(pattern) = lookup("EVENTDBX_NOISE_PATTERN").filter(|p| !p.trim().is_empty()) {
            builder.noise_pattern = pattern.trim().to_string();
        }
        builder
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn token(mut self, token: &str) -> Self {
        self.token = token.trim().to_string();
        self
    }

    pub fn tenant_id(mut self, tenant_id: &str) -> Self {
        self.tenant_id = tenant_id.trim().to_string();
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn no_noise(mut self, no_noise: bool) -> Self {
        self.no_noise = no_noise;
        self
    }

    pub fn noise_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.noise_pattern = pattern.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn build(self) -> ClientResult<ClientConfig> {
        if self.host.trim().is_empty() {
            return Err(ClientError::Configuration("host is required".into()));
        }
        if self.port == 0 {
            return Err(ClientError::Configuration(
                "port must be in range 1-65535".into(),
            ));
        }
        if self.connect_timeout.is_zero() || self.request_timeout.is_zero() {
            return Err(ClientError::Configuration(
                "timeouts must be greater than zero".into(),
            ));
        }
        if self.noise_pattern.trim().is_empty() {
            return Err(ClientError::Configuration(
                "noise pattern must not be blank".into(),
            ));
        }

        Ok(ClientConfig {
            host: self.host.trim().to_string(),
            port: self.port,
            connect_timeout: self.connect_timeout,
            request_timeout: self.request_timeout,
            token: self.token,
            tenant_id: self.tenant_id,
            verbose: self.verbose,
            no_noise: self.no_noise,
            noise_pattern: self.noise_pattern.trim().to_string(),
            retry_policy: self.retry_policy,
        })
    }
}

fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}
