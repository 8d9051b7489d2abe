//! Dispatch bus for `custom_attribute_changed` events. Listeners register
//! during application startup and run after the attribute mutation has been
//! applied; listener failures are logged, never surfaced to the request.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::database::models::value::CustomAttributeValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOperation {
    Insert,
    Update,
}

/// Payload for one attribute change. For Map-typed attributes `object_type`
/// and `object_id` describe the mapped object; otherwise they describe the
/// owning record.
#[derive(Debug, Clone)]
pub struct CustomAttributeChange {
    pub object_type: String,
    pub object_id: Option<i64>,
    pub operation: ChangeOperation,
    pub value: CustomAttributeValue,
    pub old: Option<String>,
    /// Type name of the record whose attributes changed.
    pub service: String,
}

impl CustomAttributeChange {
    pub fn to_json(&self) -> Value {
        let mut payload = json!({
            "type": self.object_type,
            "id": self.object_id,
            "operation": self.operation,
            "value": self.value.log_json(),
        });
        if let Some(old) = &self.old {
            payload["old"] = Value::String(old.clone());
        }
        payload
    }
}

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("Listener error: {0}")]
    ListenerError(String),
}

/// A subscriber to custom attribute changes.
#[async_trait]
pub trait CustomAttributeListener: Send + Sync {
    /// Listener name for logging and debugging
    fn name(&self) -> &'static str;

    /// Check if the listener applies to this record type
    fn applies_to(&self, _type_name: &str) -> bool {
        true
    }

    async fn on_change(&self, change: &CustomAttributeChange) -> Result<(), SignalError>;
}

/// Registry and dispatcher for attribute-change listeners.
#[derive(Default)]
pub struct SignalBus {
    listeners: Vec<Box<dyn CustomAttributeListener>>,
}

impl SignalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, listener: Box<dyn CustomAttributeListener>) {
        tracing::debug!("Registered custom attribute listener: {}", listener.name());
        self.listeners.push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Dispatch one change to every applicable listener. Errors are logged
    /// per listener and swallowed: signal side effects are not part of the
    /// request error surface.
    pub async fn dispatch(&self, change: &CustomAttributeChange) {
        let applicable = self
            .listeners
            .iter()
            .filter(|listener| listener.applies_to(&change.service));

        let results = futures::future::join_all(
            applicable.map(|listener| async move { (listener.name(), listener.on_change(change).await) }),
        )
        .await;

        for (name, result) in results {
            if let Err(error) = result {
                tracing::error!("Listener '{}' failed on custom_attribute_changed: {}", name, error);
            }
        }
    }

    /// Dispatch a batch in order.
    pub async fn dispatch_all(&self, changes: &[CustomAttributeChange]) {
        for change in changes {
            self.dispatch(change).await;
        }
    }
}
