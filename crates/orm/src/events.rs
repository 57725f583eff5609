use async_trait::async_trait;

use crate::event_error::EventError;

/// Lifecycle observer for one model type.
///
/// Pre-hooks (`creating`, `updating`, `deleting`) run before the model's own
/// `will_*` hook and may veto the operation by returning an error. Post-hooks
/// run after the backend call succeeded.
#[async_trait]
pub trait ModelObserver<T>: Send + Sync {
    async fn creating(&self, _model: &mut T) -> Result<(), EventError> {
        Ok(())
    }

    async fn created(&self, _model: &T) -> Result<(), EventError> {
        Ok(())
    }

    async fn updating(&self, _model: &mut T) -> Result<(), EventError> {
        Ok(())
    }

    async fn updated(&self, _model: &T) -> Result<(), EventError> {
        Ok(())
    }

    async fn deleting(&self, _model: &T) -> Result<(), EventError> {
        Ok(())
    }

    async fn deleted(&self, _model: &T) -> Result<(), EventError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    struct TestUser {
        name: String,
        email: String,
    }

    #[derive(Debug, Clone)]
    struct EmailNormalizer {
        events: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ModelObserver<TestUser> for EmailNormalizer {
        async fn creating(&self, model: &mut TestUser) -> Result<(), EventError> {
            if !model.email.contains('@') {
                return Err(EventError::validation_with_hint(
                    "Invalid email format",
                    "Use format user@domain.com",
                ));
            }
            model.email = model.email.to_lowercase();
            self.events
                .lock()
                .unwrap()
                .push(format!("creating: {}", model.name));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_pre_hook_can_mutate_and_veto() {
        let observer = EmailNormalizer {
            events: Arc::new(Mutex::new(Vec::new())),
        };

        let mut user = TestUser {
            name: "Ada".to_string(),
            email: "ADA@Example.com".to_string(),
        };
        observer.creating(&mut user).await.unwrap();
        assert_eq!(user.email, "ada@example.com");

        let mut bad = TestUser {
            name: "Grace".to_string(),
            email: "nope".to_string(),
        };
        assert!(observer.creating(&mut bad).await.is_err());
        assert_eq!(observer.events.lock().unwrap().clone(), vec!["creating: Ada"]);

        // Hooks without an override accept everything
        assert!(observer.deleted(&user).await.is_ok());
    }
}
