use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::{ConfigurationError, Effect, LinkGrant, PermissionArgs};

/// One statement of an IAM policy document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyStatement {
    pub effect: &'static str,
    pub action: Vec<String>,
    pub resource: Vec<String>,
}

impl From<&PermissionArgs> for PolicyStatement {
    fn from(permission: &PermissionArgs) -> Self {
        Self {
            effect: match permission.effect {
                Effect::Allow => "Allow",
                Effect::Deny => "Deny",
            },
            action: permission.actions.clone(),
            resource: permission.resources.clone(),
        }
    }
}

/// Turns a service's links into the permissions and environment they grant.
///
/// Only consulted when the service does not supply its own task role.
pub trait PermissionResolver: Send + Sync {
    fn resolve(&self, links: &[String]) -> Result<LinkGrant, ConfigurationError>;
}

/// Resolver backed by a fixed table of named grants
#[derive(Debug, Clone, Default)]
pub struct StaticPermissions {
    grants: BTreeMap<String, LinkGrant>,
}

impl StaticPermissions {
    pub fn new(grants: BTreeMap<String, LinkGrant>) -> Self {
        Self { grants }
    }

    pub fn with_grant(mut self, name: impl Into<String>, grant: LinkGrant) -> Self {
        self.grants.insert(name.into(), grant);
        self
    }
}

impl PermissionResolver for StaticPermissions {
    fn resolve(&self, links: &[String]) -> Result<LinkGrant, ConfigurationError> {
        let mut combined = LinkGrant::default();
        for link in links {
            let grant = self
                .grants
                .get(link)
                .ok_or_else(|| ConfigurationError::UnknownLink(link.clone()))?;
            combined.permissions.extend(grant.permissions.iter().cloned());
            combined
                .environment
                .extend(grant.environment.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Ok(combined)
    }
}

/// Policy document for a list of statements
pub fn policy_document(statements: &[PolicyStatement]) -> serde_json::Value {
    serde_json::json!({
        "Version": "2012-10-17",
        "Statement": statements,
    })
}
