//! Shared fixtures for coordinator integration tests

// Each test binary uses its own subset of these helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use autoadjust::{
    AdjustKind, Adjustments, AutoComputeGateway, ComputeOutput, GroupEvent, SourceHandle,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted result for one entry id.
#[derive(Clone)]
enum Scripted {
    Succeed(ComputeOutput),
    Fail(String),
    /// First call succeeds, every later call fails.
    SucceedThenFail(ComputeOutput, String),
}

/// Programmable auto-compute gateway.
///
/// Each entry id maps to a scripted output; unscripted ids succeed with an
/// empty record and no features. Every call is logged so tests can assert
/// how often and in which order entries were computed.
pub struct MockGateway {
    scripts: Mutex<HashMap<String, Scripted>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<String>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            delay: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Script a successful compute: feature vector + computed-kind fields.
    pub fn with_output(self, id: &str, features: &[f64], adjustments: Adjustments) -> Self {
        self.scripts.lock().unwrap().insert(
            id.to_string(),
            Scripted::Succeed(ComputeOutput {
                features: Some(features.to_vec()),
                adjustments,
            }),
        );
        self
    }

    /// Script a successful compute with no feature vector.
    pub fn with_featureless_output(self, id: &str, adjustments: Adjustments) -> Self {
        self.scripts.lock().unwrap().insert(
            id.to_string(),
            Scripted::Succeed(ComputeOutput {
                features: None,
                adjustments,
            }),
        );
        self
    }

    /// Script one successful compute, then failures on recomputation.
    pub fn with_output_then_failure(
        self,
        id: &str,
        features: &[f64],
        adjustments: Adjustments,
        message: &str,
    ) -> Self {
        self.scripts.lock().unwrap().insert(
            id.to_string(),
            Scripted::SucceedThenFail(
                ComputeOutput {
                    features: Some(features.to_vec()),
                    adjustments,
                },
                message.to_string(),
            ),
        );
        self
    }

    /// Script a compute failure.
    pub fn with_failure(self, id: &str, message: &str) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(id.to_string(), Scripted::Fail(message.to_string()));
        self
    }

    /// Sleep this long inside every compute call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Ids in call order, repeats included.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, id: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == id).count()
    }
}

#[async_trait]
impl AutoComputeGateway for MockGateway {
    async fn compute(
        &self,
        entry_id: &str,
        _source: &SourceHandle,
        _kinds: &[AdjustKind],
    ) -> anyhow::Result<ComputeOutput> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let prior_calls = {
            let mut calls = self.calls.lock().unwrap();
            let prior = calls.iter().filter(|c| *c == entry_id).count();
            calls.push(entry_id.to_string());
            prior
        };

        let scripted = self.scripts.lock().unwrap().get(entry_id).cloned();
        match scripted {
            Some(Scripted::Succeed(output)) => Ok(output),
            Some(Scripted::Fail(message)) => Err(anyhow::anyhow!(message)),
            Some(Scripted::SucceedThenFail(output, message)) => {
                if prior_calls == 0 {
                    Ok(output)
                } else {
                    Err(anyhow::anyhow!(message))
                }
            }
            None => Ok(ComputeOutput::default()),
        }
    }
}

/// Collects every event from a group subscription in the background.
pub struct EventLog {
    events: Arc<Mutex<Vec<GroupEvent>>>,
}

impl EventLog {
    pub fn attach(group: &autoadjust::AdjustmentGroup) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let mut rx = group.subscribe();
        tokio::spawn(async move {
            while let Ok(event) = rx.recv().await {
                sink.lock().unwrap().push(event);
            }
        });
        Self { events }
    }

    pub fn all(&self) -> Vec<GroupEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Give the background drain task a moment to catch up with the bus.
    pub async fn settle(&self) {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }

    /// Status history of one entry, in emission order.
    pub fn statuses_of(&self, id: &str) -> Vec<autoadjust::EntryStatus> {
        self.all()
            .iter()
            .filter_map(|e| match e {
                GroupEvent::EntryStatusChanged {
                    entry_id, status, ..
                } if entry_id == id => Some(*status),
                _ => None,
            })
            .collect()
    }

    pub fn count_of(&self, event_type: &str) -> usize {
        self.all()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }
}

/// A source handle for tests; the coordinator never looks inside.
pub fn dummy_source() -> SourceHandle {
    SourceHandle::new("test-image-bytes")
}

/// Route coordinator logs to the test output; `RUST_LOG` filters as usual.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
