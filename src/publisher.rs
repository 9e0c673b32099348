//! Hand-off of events to an external message broker.
//!
//! The broker client itself lives outside this crate; the supervisor only depends on
//! the [`Publisher`] trait. The unit type is the disabled publisher.

use std::collections::BTreeMap;
use std::future::Future;

use serde::Serialize;

use crate::event::Event;

/// Meta key carrying the host the controller runs on.
pub const META_HOST: &str = "host";
/// Meta key carrying the plugin process name.
pub const META_PLUGIN: &str = "plugin";

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to encode message `{name}`: {source}")]
    Encode {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to deliver message `{name}` to scope `{scope}`: {reason}")]
    Delivery {
        name: String,
        scope: String,
        reason: String,
    },
}

/// A broker message derived from an [`Event`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishedMessage {
    pub name: String,
    pub value: f64,
    /// Nanoseconds since the UNIX epoch.
    pub timestamp: u64,
    pub meta: BTreeMap<String, String>,
}

impl PublishedMessage {
    pub fn from_event(event: &Event, meta: BTreeMap<String, String>) -> Self {
        Self {
            name: event.name().to_owned(),
            value: event.kind().value(),
            timestamp: event.timestamp(),
            meta,
        }
    }

    /// # Errors
    ///
    /// Returns [`PublishError::Encode`] if serialization fails.
    pub fn to_json(&self) -> Result<String, PublishError> {
        serde_json::to_string(self).map_err(|source| PublishError::Encode {
            name: self.name.clone(),
            source,
        })
    }
}

impl From<&Event> for PublishedMessage {
    fn from(event: &Event) -> Self {
        Self::from_event(event, BTreeMap::new())
    }
}

pub trait Publisher: Send + Sync + 'static {
    /// Delivers `message` to the broker under `scope`.
    fn publish(
        &self,
        message: PublishedMessage,
        scope: &str,
    ) -> impl Future<Output = Result<(), PublishError>> + Send;
}

impl Publisher for () {
    async fn publish(&self, _message: PublishedMessage, _scope: &str) -> Result<(), PublishError> {
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    #[test]
    fn test_message_from_event() {
        let event = Event::at(EventKind::PerfMemory(2048), 99);
        let message = PublishedMessage::from_event(
            &event,
            BTreeMap::from([(META_PLUGIN.to_owned(), "plugin-x".to_owned())]),
        );
        assert_eq!(message.name, "sys.plugin.perf.mem");
        assert_eq!(message.value, 2048.0);
        assert_eq!(message.timestamp, 99);
        assert_eq!(message.meta[META_PLUGIN], "plugin-x");
    }

    #[test]
    fn test_message_json() {
        let message = PublishedMessage::from(&Event::at(EventKind::PerfCpu(50.0), 1));
        let value: serde_json::Value = serde_json::from_str(&message.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "name": "sys.plugin.perf.cpu",
                "value": 50.0,
                "timestamp": 1,
                "meta": {},
            })
        );
    }

    #[tokio::test]
    async fn test_disabled_publisher_accepts_everything() {
        let message = PublishedMessage::from(&Event::at(EventKind::PerfCpu(1.0), 1));
        ().publish(message, "node").await.unwrap();
    }
}
