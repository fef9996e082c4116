//! HTTP producer.

use std::sync::{Mutex, MutexGuard, PoisonError};

use logrelay_core::{IngestRequest, Level, SessionKey, Value, event::now};

use crate::{
    ClientError, LoggerConfig,
    guard::{ErrorGuard, ProducerState},
};

/// Ships log events for one session key to a relay.
///
/// The level methods (`debug`, `info`, ...) never surface failures: they
/// return whether the event was accepted and feed the consecutive-error
/// guard. Use [`Logger::send`] to see the error.
#[derive(Debug)]
pub struct Logger {
    http: reqwest::Client,
    endpoint: String,
    key: SessionKey,
    guard: Mutex<ErrorGuard>,
}

impl Logger {
    pub fn new(config: LoggerConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let key = SessionKey::new(config.key)
            .map_err(|e| ClientError::InvalidConfig(e.to_string()))?;
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            http,
            endpoint: config.server_url,
            key,
            guard: Mutex::new(ErrorGuard::new(config.disable_on_errors)),
        })
    }

    #[must_use]
    pub const fn key(&self) -> &SessionKey {
        &self.key
    }

    pub async fn debug(&self, data: Vec<Value>) -> bool {
        self.emit(Level::Debug, data).await
    }

    pub async fn info(&self, data: Vec<Value>) -> bool {
        self.emit(Level::Info, data).await
    }

    pub async fn warning(&self, data: Vec<Value>) -> bool {
        self.emit(Level::Warning, data).await
    }

    pub async fn error(&self, data: Vec<Value>) -> bool {
        self.emit(Level::Error, data).await
    }

    /// Alias for [`Logger::info`].
    pub async fn log(&self, data: Vec<Value>) -> bool {
        self.info(data).await
    }

    async fn emit(&self, level: Level, data: Vec<Value>) -> bool {
        match self.send(level, data).await {
            Ok(()) => true,
            Err(ClientError::Disabled(_)) => false,
            Err(e) => {
                tracing::debug!(key = %self.key, "Dropped log event: {e}");
                false
            }
        }
    }

    /// Send one event and report why it failed, if it did.
    pub async fn send(&self, level: Level, data: Vec<Value>) -> Result<(), ClientError> {
        let state = self.guard().state();
        if let ProducerState::Disabled(reason) = state {
            return Err(ClientError::Disabled(reason));
        }

        let request = IngestRequest {
            key: self.key.clone(),
            level,
            data,
            timestamp: Some(now()),
        };
        let result = self.post(&request).await;

        let mut guard = self.guard();
        if result.is_ok() {
            guard.record_success();
        } else if let Some(ProducerState::Disabled(reason)) = guard.record_failure() {
            tracing::warn!(key = %self.key, endpoint = %self.endpoint, "Logger {reason}");
        }
        result
    }

    async fn post(&self, request: &IngestRequest) -> Result<(), ClientError> {
        let resp = self.http.post(&self.endpoint).json(request).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ClientError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    #[must_use]
    pub fn state(&self) -> ProducerState {
        self.guard().state()
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.guard().is_enabled()
    }

    /// Resume sending. The error count is left as is.
    pub fn enable(&self) {
        self.guard().enable();
    }

    pub fn disable(&self) {
        self.guard().disable();
    }

    #[must_use]
    pub fn error_count(&self) -> u32 {
        self.guard().error_count()
    }

    pub fn clear_error_count(&self) {
        self.guard().clear_error_count();
    }

    /// Change the auto-disable threshold. Zero never disables.
    pub fn set_disable_on_errors(&self, threshold: u32) {
        self.guard().set_threshold(threshold);
    }

    fn guard(&self) -> MutexGuard<'_, ErrorGuard> {
        self.guard.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
