//! Seam to the infrastructure engine that actually creates resources.

use std::collections::HashSet;
use std::sync::Mutex;

use thiserror::Error;
use tracing::debug;

use super::resources::{ResourceHandle, ResourceRequest};

/// Failure reported by the engine. Passed to callers unchanged.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Failed to create {resource}: {message}")]
pub struct ProviderError {
    pub resource: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            message: message.into(),
        }
    }
}

/// Creates one resource per call, in the order the facade issues them.
pub trait ResourceProvider: Send + Sync {
    fn create(&self, request: &ResourceRequest) -> Result<ResourceHandle, ProviderError>;
}

/// In-memory provider that records every call instead of creating anything.
///
/// Used by `ecsform plan` and in tests. It checks what a real engine would:
/// logical names are unique and every dependency was created first.
#[derive(Debug, Default)]
pub struct PlanRecorder {
    calls: Mutex<Vec<ResourceRequest>>,
}

impl PlanRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests received so far, in call order
    pub fn calls(&self) -> Vec<ResourceRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResourceProvider for PlanRecorder {
    fn create(&self, request: &ResourceRequest) -> Result<ResourceHandle, ProviderError> {
        let mut calls = self
            .calls
            .lock()
            .map_err(|_| ProviderError::new(&request.name, "recorder lock poisoned"))?;

        let created: HashSet<&str> = calls.iter().map(|c| c.name.as_str()).collect();
        if created.contains(request.name.as_str()) {
            return Err(ProviderError::new(
                &request.name,
                "a resource with this name already exists",
            ));
        }
        if let Some(missing) = request
            .depends_on
            .iter()
            .find(|dep| !created.contains(dep.as_str()))
        {
            return Err(ProviderError::new(
                &request.name,
                format!("depends on '{}', which has not been created", missing),
            ));
        }

        debug!("Recorded {} '{}'", request.kind.type_token(), request.name);
        let handle = ResourceHandle {
            kind: request.kind,
            name: request.name.clone(),
            id: format!("urn:ecsform:{}::{}", request.kind.type_token(), request.name),
        };
        calls.push(request.clone());
        Ok(handle)
    }
}
