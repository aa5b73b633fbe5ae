//! Engine-level error: domain rejections plus infrastructure failures.

use thiserror::Error;

use supplyline_auth::AuthzError;
use supplyline_core::DomainError;

use crate::event_store::EventStoreError;

/// Error returned by every `FulfillmentEngine` and `InventoryLedger` operation.
///
/// Domain rejections (`Domain`) are recoverable by the caller and leave no
/// trace in the store. The other variants are infrastructure failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("event store failure: {0}")]
    Store(EventStoreError),

    /// A historical payload could not be decoded into the aggregate's event type.
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),

    /// Publication failed after a successful append (at-least-once; retry may duplicate).
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl EngineError {
    /// The domain rejection, if this is one.
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            EngineError::Domain(e) => Some(e),
            _ => None,
        }
    }

    /// The stream moved under us; reloading and re-deciding may succeed.
    pub fn is_concurrency(&self) -> bool {
        matches!(self, EngineError::Store(EventStoreError::Concurrency(_)))
    }

    /// The events were appended; only their broadcast failed.
    pub fn is_unpublished(&self) -> bool {
        matches!(self, EngineError::Publish(_))
    }

    /// Turn a lost optimistic-concurrency race into a domain `Conflict`.
    pub(crate) fn into_conflict(self) -> Self {
        match self {
            EngineError::Store(EventStoreError::Concurrency(msg)) => {
                EngineError::Domain(DomainError::conflict(msg))
            }
            other => other,
        }
    }
}

impl From<EventStoreError> for EngineError {
    fn from(value: EventStoreError) -> Self {
        EngineError::Store(value)
    }
}

impl From<AuthzError> for EngineError {
    fn from(value: AuthzError) -> Self {
        EngineError::Domain(value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lost_race_becomes_domain_conflict() {
        let err = EngineError::from(EventStoreError::Concurrency("stale".into()));
        assert!(err.is_concurrency());

        let err = err.into_conflict();
        assert!(matches!(err.domain(), Some(DomainError::Conflict(_))));
    }

    #[test]
    fn other_store_errors_stay_infrastructure() {
        let err = EngineError::from(EventStoreError::Unavailable("down".into())).into_conflict();
        assert!(err.domain().is_none());
        assert!(!err.is_concurrency());
        assert!(!err.is_unpublished());
    }

    #[test]
    fn publish_failure_is_recognized() {
        let err = EngineError::Publish("bus down".into());
        assert!(err.is_unpublished());
        assert_eq!(err.clone().into_conflict(), err);
    }
}
