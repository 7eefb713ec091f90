//! Mutation hooks applied to raw resource arguments right before creation.
//!
//! Hooks are opaque: whatever they do to the arguments is passed on to the
//! engine without further validation.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::resources::{ResourceKind, ResourceRequest};
use crate::config::ConfigurationError;

/// Hook called with the logical resource name and its arguments
pub type TransformFn = Arc<dyn Fn(&str, &mut Value) + Send + Sync>;

#[derive(Clone, Default)]
pub struct Transforms {
    hooks: BTreeMap<ResourceKind, Vec<TransformFn>>,
}

impl fmt::Debug for Transforms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: BTreeMap<_, _> = self.hooks.iter().map(|(k, v)| (k.key(), v.len())).collect();
        f.debug_struct("Transforms").field("hooks", &counts).finish()
    }
}

impl Transforms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a hook for every resource of `kind`.
    pub fn on<F>(mut self, kind: ResourceKind, hook: F) -> Self
    where
        F: Fn(&str, &mut Value) + Send + Sync + 'static,
    {
        self.hooks.entry(kind).or_default().push(Arc::new(hook));
        self
    }

    /// Build hooks from JSON merge patches keyed by resource kind.
    pub fn from_patches(patches: &BTreeMap<String, Value>) -> Result<Self, ConfigurationError> {
        let mut transforms = Self::new();
        for (key, patch) in patches {
            let kind = ResourceKind::from_key(key)
                .ok_or_else(|| ConfigurationError::UnknownTransformTarget(key.clone()))?;
            let patch = patch.clone();
            transforms = transforms.on(kind, move |_, args| merge_patch(args, &patch));
        }
        Ok(transforms)
    }

    /// Hooks of `self` run first, then those of `other`.
    pub fn merged(&self, other: &Transforms) -> Transforms {
        let mut merged = self.clone();
        for (kind, hooks) in &other.hooks {
            merged.hooks.entry(*kind).or_default().extend(hooks.iter().cloned());
        }
        merged
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run the hooks for the request's kind. References added by a hook
    /// become dependencies.
    pub fn apply(&self, request: &mut ResourceRequest) {
        let Some(hooks) = self.hooks.get(&request.kind) else {
            return;
        };
        for hook in hooks {
            hook(&request.name, &mut request.args);
        }
        request.refresh_dependencies();
    }
}

/// RFC 7386 JSON merge patch: objects merge recursively, `null` removes a
/// key, anything else replaces the target.
pub fn merge_patch(target: &mut Value, patch: &Value) {
    let Value::Object(patch_map) = patch else {
        *target = patch.clone();
        return;
    };

    if !target.is_object() {
        *target = Value::Object(Default::default());
    }
    if let Value::Object(target_map) = target {
        for (key, value) in patch_map {
            if value.is_null() {
                target_map.remove(key);
            } else {
                merge_patch(target_map.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
    }
}
