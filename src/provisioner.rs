//! Lookup-or-create of the durable log.
//!
//! Lookup then create is not transactional. Two provisioners may both try to
//! create the same log; the broker rejects the loser, which then reads the
//! winner's descriptor back. No lock is taken on our side.

use std::sync::Arc;

use tracing::{info, warn};

use crate::broker::{BrokerError, LogDescriptor, LogState, StreamBroker};

/// Whether the log was found or created by this call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Existing,
    Created,
}

/// Result of [`StreamProvisioner::ensure_log`].
#[derive(Debug, Clone, PartialEq)]
pub struct Provisioned {
    /// Descriptor as stored by the broker
    pub descriptor: LogDescriptor,

    pub outcome: ProvisionOutcome,

    /// Counters at lookup time; zero for a freshly created log
    pub state: LogState,
}

/// Provisioning failed; the caller must not publish.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ProvisionError {
    #[error("failed to look up log '{name}': {source}")]
    Lookup { name: String, source: BrokerError },

    #[error("failed to create log '{name}': {source}")]
    Create { name: String, source: BrokerError },

    #[error("log '{0}' was reported as existing but could not be read back")]
    Vanished(String),
}

/// Ensures a named durable log exists.
pub struct StreamProvisioner {
    broker: Arc<dyn StreamBroker>,
}

impl StreamProvisioner {
    pub fn new(broker: Arc<dyn StreamBroker>) -> Self {
        Self { broker }
    }

    /// Return the log named `desired.name`, creating it with `desired` if absent.
    ///
    /// An existing log is returned as stored, even when its policy differs
    /// from `desired`.
    pub async fn ensure_log(&self, desired: &LogDescriptor) -> Result<Provisioned, ProvisionError> {
        if let Some(existing) = self.lookup(&desired.name).await? {
            return Ok(existing.logged(desired));
        }

        info!(log = %desired.name, "Log not found, creating it");

        match self.broker.create_stream(desired).await {
            Ok(descriptor) => {
                info!(
                    log = %descriptor.name,
                    subjects = ?descriptor.subjects,
                    max_age_secs = descriptor.max_age.as_secs(),
                    max_bytes = descriptor.max_bytes,
                    "Log created"
                );
                Ok(Provisioned {
                    descriptor,
                    outcome: ProvisionOutcome::Created,
                    state: LogState::default(),
                })
            }
            Err(BrokerError::AlreadyExists(_)) => {
                // Lost a creation race; the winner's log is the one we use
                info!(log = %desired.name, "Log created concurrently, reading it back");
                let existing = self
                    .lookup(&desired.name)
                    .await?
                    .ok_or_else(|| ProvisionError::Vanished(desired.name.clone()))?;
                Ok(existing.logged(desired))
            }
            Err(source) => Err(ProvisionError::Create {
                name: desired.name.clone(),
                source,
            }),
        }
    }

    async fn lookup(&self, name: &str) -> Result<Option<Provisioned>, ProvisionError> {
        let info = self
            .broker
            .stream_info(name)
            .await
            .map_err(|source| ProvisionError::Lookup {
                name: name.to_string(),
                source,
            })?;

        Ok(info.map(|info| Provisioned {
            descriptor: info.descriptor,
            outcome: ProvisionOutcome::Existing,
            state: info.state,
        }))
    }
}

impl Provisioned {
    fn logged(self, desired: &LogDescriptor) -> Self {
        info!(
            log = %self.descriptor.name,
            messages = self.state.messages,
            bytes = self.state.bytes,
            last_sequence = self.state.last_sequence,
            "Log existed"
        );
        if self.descriptor != *desired {
            warn!(
                log = %self.descriptor.name,
                stored = ?self.descriptor,
                desired = ?desired,
                "Stored log policy differs from the requested one; keeping the stored policy"
            );
        }
        self
    }
}
