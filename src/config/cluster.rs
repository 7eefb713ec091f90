use serde::{Deserialize, Serialize};

use super::error::ConfigurationError;

/// Service discovery namespace the cluster registers services in
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NamespaceArgs {
    pub id: String,
    /// DNS name of the namespace, e.g. "internal.example"
    pub name: String,
}

/// Network placement shared by every service of a cluster
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VpcArgs {
    pub id: String,
    pub load_balancer_subnets: Vec<String>,
    #[serde(alias = "serviceSubnets")]
    pub container_subnets: Vec<String>,
    #[serde(default)]
    pub security_groups: Vec<String>,
    pub cloudmap_namespace: Option<NamespaceArgs>,
}

/// Arguments to `Cluster::new`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterArgs {
    pub vpc: VpcArgs,
    /// Set to "v2" to allow moving an existing cluster to the current layout
    pub force_upgrade: Option<String>,
}

impl ClusterArgs {
    pub fn new(vpc: VpcArgs) -> Self {
        Self {
            vpc,
            force_upgrade: None,
        }
    }

    pub fn with_force_upgrade(mut self, version: impl Into<String>) -> Self {
        self.force_upgrade = Some(version.into());
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let required = [
            ("vpc.id", self.vpc.id.trim().is_empty()),
            ("vpc.loadBalancerSubnets", self.vpc.load_balancer_subnets.is_empty()),
            ("vpc.containerSubnets", self.vpc.container_subnets.is_empty()),
        ];
        match required.into_iter().find(|(_, empty)| *empty) {
            Some((field, _)) => Err(ConfigurationError::EmptySubnets(field)),
            None => Ok(()),
        }
    }
}
