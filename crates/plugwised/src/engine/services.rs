use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use thiserror::Error;
use tracing::debug;
use tracing::warn;

/// Future returned by a service handler
pub type ServiceFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Service handler function type
pub type ServiceHandler = Arc<dyn Fn() -> ServiceFuture + Send + Sync>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service not found: {domain}.{service}")]
    NotFound { domain: String, service: String },

    #[error("service {domain}.{service} failed: {message}")]
    CallFailed {
        domain: String,
        service: String,
        message: String,
    },
}

/// Services registered by integrations, keyed by `(domain, service)`.
#[derive(Default)]
pub struct ServiceRegistry {
    services: Mutex<HashMap<(String, String), ServiceHandler>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service, replacing any handler already registered under the same name.
    pub fn register<F, Fut>(
        &self,
        domain: impl Into<String>,
        service: impl Into<String>,
        handler: F,
    )
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let domain = domain.into();
        let service = service.into();
        debug!("Registering service {}.{}", domain, service);

        let handler: ServiceHandler = Arc::new(move || Box::pin(handler()) as ServiceFuture);
        self.lock().insert((domain, service), handler);
    }

    /// Remove a service. Returns whether it was registered.
    pub fn unregister(&self, domain: &str, service: &str) -> bool {
        debug!("Unregistering service {}.{}", domain, service);
        self.lock()
            .remove(&(domain.to_string(), service.to_string()))
            .is_some()
    }

    pub fn has_service(&self, domain: &str, service: &str) -> bool {
        self.lock()
            .contains_key(&(domain.to_string(), service.to_string()))
    }

    /// All registered services as `(domain, service)` pairs, sorted.
    pub fn services(&self) -> Vec<(String, String)> {
        let mut services: Vec<_> = self.lock().keys().cloned().collect();
        services.sort();
        services
    }

    /// Call a service and wait for its handler to finish.
    pub async fn call(&self, domain: &str, service: &str) -> Result<(), ServiceError> {
        let handler = self
            .lock()
            .get(&(domain.to_string(), service.to_string()))
            .cloned()
            .ok_or_else(|| {
                warn!("Service not found: {}.{}", domain, service);
                ServiceError::NotFound {
                    domain: domain.to_string(),
                    service: service.to_string(),
                }
            })?;

        debug!("Calling service {}.{}", domain, service);
        handler().await.map_err(|e| ServiceError::CallFailed {
            domain: domain.to_string(),
            service: service.to_string(),
            message: format!("{:#}", e),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), ServiceHandler>> {
        self.services.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;

    #[tokio::test]
    async fn test_call_registered_service() {
        let registry = ServiceRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        registry.register("plugwise", "update", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        assert!(registry.has_service("plugwise", "update"));
        registry.call("plugwise", "update").await.unwrap();
        registry.call("plugwise", "update").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_call_unknown_service() {
        let registry = ServiceRegistry::new();
        let err = registry.call("plugwise", "update").await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::NotFound {
                ref domain,
                ref service,
            } if domain == "plugwise" && service == "update"
        ));
    }

    #[tokio::test]
    async fn test_handler_failure() {
        let registry = ServiceRegistry::new();
        registry.register("plugwise", "update", || async {
            Err(anyhow::anyhow!("gateway unreachable"))
        });

        let err = registry.call("plugwise", "update").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "service plugwise.update failed: gateway unreachable"
        );
    }

    #[tokio::test]
    async fn test_unregister() {
        let registry = ServiceRegistry::new();
        registry.register("plugwise", "update", || async { Ok(()) });
        registry.register("plugwise", "reload", || async { Ok(()) });

        assert_eq!(
            registry.services(),
            vec![
                ("plugwise".to_string(), "reload".to_string()),
                ("plugwise".to_string(), "update".to_string()),
            ]
        );

        assert!(registry.unregister("plugwise", "update"));
        assert!(!registry.unregister("plugwise", "update"));
        assert!(!registry.has_service("plugwise", "update"));
    }
}
