//! In-process broker used for local runs and tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use super::{BrokerError, LogDescriptor, LogInfo, LogState, PublishAcknowledgment, RetentionPolicy, StreamBroker};

/// A record stored by the in-memory broker.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub sequence: u64,
    pub subject: String,
    pub payload: Bytes,
}

#[derive(Debug)]
struct StoredLog {
    descriptor: LogDescriptor,
    last_sequence: u64,
    bytes: u64,
    records: VecDeque<StoredRecord>,
}

impl StoredLog {
    fn new(descriptor: LogDescriptor, last_sequence: u64) -> Self {
        Self {
            descriptor,
            last_sequence,
            bytes: 0,
            records: VecDeque::new(),
        }
    }

    fn state(&self) -> LogState {
        LogState {
            messages: self.records.len() as u64,
            bytes: self.bytes,
            last_sequence: self.last_sequence,
        }
    }

    fn append(&mut self, subject: &str, payload: Bytes) -> u64 {
        self.last_sequence += 1;
        self.bytes += payload.len() as u64;
        self.records.push_back(StoredRecord {
            sequence: self.last_sequence,
            subject: subject.to_string(),
            payload,
        });

        // Size limit discards the oldest records first
        if self.descriptor.retention == RetentionPolicy::Limits && self.descriptor.max_bytes > 0 {
            let limit = self.descriptor.max_bytes as u64;
            while self.bytes > limit && self.records.len() > 1 {
                if let Some(dropped) = self.records.pop_front() {
                    self.bytes -= dropped.payload.len() as u64;
                }
            }
        }

        self.last_sequence
    }
}

#[derive(Debug, Default)]
struct State {
    logs: HashMap<String, StoredLog>,
    unavailable: bool,
    race_winner: Option<LogDescriptor>,
}

/// In-memory stand-in for a JetStream server.
///
/// Logs are routed by subject filter, sequences start at 1 per log, and
/// duplicate creates are rejected. Faults can be injected for tests.
#[derive(Debug, Default)]
pub struct InMemoryBroker {
    state: Mutex<State>,
    fail_publishes: AtomicU32,
    publish_latency_ms: AtomicU64,
    lookups: AtomicU64,
    creates: AtomicU64,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a log whose last assigned sequence is `last_sequence`.
    pub fn with_log(self, descriptor: LogDescriptor, last_sequence: u64) -> Self {
        self.lock()
            .logs
            .insert(descriptor.name.clone(), StoredLog::new(descriptor, last_sequence));
        self
    }

    /// Fail the next `count` publishes with a transport error.
    pub fn fail_next_publishes(&self, count: u32) {
        self.fail_publishes.store(count, Ordering::SeqCst);
    }

    /// Reject every request as if the connection were lost.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Delay every publish acknowledgment.
    pub fn set_publish_latency(&self, latency: Duration) {
        self.publish_latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Make the next create lose a race: `winner` is stored first and the
    /// create is rejected as a duplicate.
    pub fn race_next_create(&self, winner: LogDescriptor) {
        self.lock().race_winner = Some(winner);
    }

    /// Records currently retained by a log, oldest first.
    pub fn records(&self, name: &str) -> Vec<StoredRecord> {
        self.lock()
            .logs
            .get(name)
            .map(|log| log.records.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of lookups served.
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Number of create requests received.
    pub fn create_count(&self) -> u64 {
        self.creates.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn take_publish_failure(&self) -> bool {
        self.fail_publishes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl StreamBroker for InMemoryBroker {
    async fn stream_info(&self, name: &str) -> Result<Option<LogInfo>, BrokerError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        if state.unavailable {
            return Err(BrokerError::Unavailable("in-memory broker offline".to_string()));
        }
        Ok(state.logs.get(name).map(|log| LogInfo {
            descriptor: log.descriptor.clone(),
            state: log.state(),
        }))
    }

    async fn create_stream(&self, descriptor: &LogDescriptor) -> Result<LogDescriptor, BrokerError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        if state.unavailable {
            return Err(BrokerError::Unavailable("in-memory broker offline".to_string()));
        }

        for filter in &descriptor.subjects {
            crate::subject::validate_filter(filter).map_err(|e| BrokerError::Rejected(e.to_string()))?;
        }

        if let Some(winner) = state.race_winner.take() {
            state
                .logs
                .entry(winner.name.clone())
                .or_insert_with(|| StoredLog::new(winner, 0));
        }

        if state.logs.contains_key(&descriptor.name) {
            return Err(BrokerError::AlreadyExists(descriptor.name.clone()));
        }

        // Each subject belongs to at most one log
        for existing in state.logs.values() {
            for filter in &descriptor.subjects {
                if let Some(other) = existing
                    .descriptor
                    .subjects
                    .iter()
                    .find(|other| crate::subject::filters_overlap(filter, other))
                {
                    return Err(BrokerError::Rejected(format!(
                        "subjects '{}' overlap '{}' of log '{}'",
                        filter, other, existing.descriptor.name
                    )));
                }
            }
        }

        debug!(log = %descriptor.name, "Creating in-memory log");
        state
            .logs
            .insert(descriptor.name.clone(), StoredLog::new(descriptor.clone(), 0));
        Ok(descriptor.clone())
    }

    async fn publish(&self, subject: &str, payload: Bytes) -> Result<PublishAcknowledgment, BrokerError> {
        let latency = self.publish_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.take_publish_failure() {
            return Err(BrokerError::Transport("injected publish failure".to_string()));
        }

        let mut state = self.lock();
        if state.unavailable {
            return Err(BrokerError::Unavailable("in-memory broker offline".to_string()));
        }

        let log = state
            .logs
            .values_mut()
            .find(|log| log.descriptor.accepts(subject))
            .ok_or_else(|| BrokerError::NoStreamForSubject(subject.to_string()))?;

        let sequence = log.append(subject, payload);
        Ok(PublishAcknowledgment {
            log_name: log.descriptor.name.clone(),
            sequence_number: sequence,
            duplicate: false,
        })
    }
}
