//! Declarative ECS/Fargate clusters and services.
//!
//! Configuration is validated and normalized in [`config`], composed into
//! ordered resource requests in [`cluster`], and handed to an external
//! infrastructure engine through [`cluster::ResourceProvider`].

pub mod cli;
pub mod cluster;
pub mod config;
pub mod state;

pub use cluster::{Cluster, ClusterError, DeployContext, Service};
pub use config::{ClusterArgs, ConfigurationError, ServiceArgs, VpcArgs};
