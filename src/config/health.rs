//! Health checks.
//!
//! Two kinds exist: the load balancer's target-group health check, whose
//! defaults depend on the protocol family of the target, and the ECS
//! container health check, which runs a command inside the container.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::ConfigurationError;
use super::ports::{PortProtocol, ProtocolFamily};
use super::units::{human_duration, parse_duration, parse_duration_or};

/// Load balancer health check overrides as written by the user
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckArgs {
    /// Request path, http/https targets only
    pub path: Option<String>,
    pub interval: Option<String>,
    pub timeout: Option<String>,
    pub healthy_threshold: Option<u32>,
    pub unhealthy_threshold: Option<u32>,
    /// Status codes considered healthy, e.g. "200" or "200-299"
    pub success_codes: Option<String>,
}

/// Resolved load balancer health check
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheck {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(with = "human_duration")]
    pub interval: Duration,
    #[serde(with = "human_duration")]
    pub timeout: Duration,
    pub healthy_threshold: u32,
    pub unhealthy_threshold: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success_codes: Option<String>,
}

const INTERVAL_RANGE: (u64, u64) = (5, 300);
const TIMEOUT_RANGE: (u64, u64) = (2, 120);
const THRESHOLD_RANGE: (u64, u64) = (2, 10);

impl HealthCheck {
    /// Defaults for a target of the given protocol family.
    pub fn defaults_for(family: ProtocolFamily) -> Self {
        match family {
            ProtocolFamily::Application => Self {
                path: Some("/".to_string()),
                interval: Duration::from_secs(30),
                timeout: Duration::from_secs(5),
                healthy_threshold: 5,
                unhealthy_threshold: 2,
                success_codes: Some("200".to_string()),
            },
            ProtocolFamily::Network => Self {
                path: None,
                interval: Duration::from_secs(30),
                timeout: Duration::from_secs(6),
                healthy_threshold: 5,
                unhealthy_threshold: 2,
                success_codes: None,
            },
        }
    }

    /// Merge user overrides onto the defaults for `target`, then range check.
    pub fn resolve(
        target: &PortProtocol,
        overrides: Option<&HealthCheckArgs>,
    ) -> Result<Self, ConfigurationError> {
        let family = target.family();
        let mut check = Self::defaults_for(family);

        if let Some(args) = overrides {
            if family == ProtocolFamily::Network
                && (args.path.is_some() || args.success_codes.is_some())
            {
                return Err(ConfigurationError::PathOnNetworkPort(target.to_string()));
            }
            if let Some(path) = &args.path {
                check.path = Some(path.clone());
            }
            if let Some(interval) = &args.interval {
                check.interval = parse_duration(interval)?;
            }
            if let Some(timeout) = &args.timeout {
                check.timeout = parse_duration(timeout)?;
            }
            if let Some(healthy) = args.healthy_threshold {
                check.healthy_threshold = healthy;
            }
            if let Some(unhealthy) = args.unhealthy_threshold {
                check.unhealthy_threshold = unhealthy;
            }
            if let Some(codes) = &args.success_codes {
                check.success_codes = Some(codes.clone());
            }
        }

        check.validate(&target.to_string())?;
        Ok(check)
    }

    pub fn validate(&self, target: &str) -> Result<(), ConfigurationError> {
        let checks = [
            ("interval", self.interval.as_secs(), INTERVAL_RANGE),
            ("timeout", self.timeout.as_secs(), TIMEOUT_RANGE),
            ("healthyThreshold", self.healthy_threshold as u64, THRESHOLD_RANGE),
            ("unhealthyThreshold", self.unhealthy_threshold as u64, THRESHOLD_RANGE),
        ];
        for (field, value, (min, max)) in checks {
            if value < min || value > max {
                return Err(ConfigurationError::HealthCheckOutOfRange {
                    target: target.to_string(),
                    field,
                    value,
                    min,
                    max,
                });
            }
        }
        Ok(())
    }
}

/// Container health check as written by the user
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerHealthArgs {
    /// Command run inside the container, e.g. `["CMD-SHELL", "curl -f http://localhost/"]`
    pub command: Vec<String>,
    pub start_period: Option<String>,
    pub timeout: Option<String>,
    pub interval: Option<String>,
    pub retries: Option<u32>,
}

/// Resolved container health check
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerHealthCheck {
    pub command: Vec<String>,
    #[serde(with = "human_duration")]
    pub start_period: Duration,
    #[serde(with = "human_duration")]
    pub timeout: Duration,
    #[serde(with = "human_duration")]
    pub interval: Duration,
    pub retries: u32,
}

impl ContainerHealthCheck {
    pub fn resolve(container: &str, args: &ContainerHealthArgs) -> Result<Self, ConfigurationError> {
        if args.command.is_empty() {
            return Err(ConfigurationError::EmptyHealthCheckCommand(container.to_string()));
        }

        let check = Self {
            command: args.command.clone(),
            start_period: parse_duration_or(args.start_period.as_deref(), 0)?,
            timeout: parse_duration_or(args.timeout.as_deref(), 5)?,
            interval: parse_duration_or(args.interval.as_deref(), 30)?,
            retries: args.retries.unwrap_or(3),
        };

        let ranges = [
            ("startPeriod", check.start_period.as_secs(), 0, 300),
            ("timeout", check.timeout.as_secs(), 2, 60),
            ("interval", check.interval.as_secs(), 5, 300),
            ("retries", check.retries as u64, 1, 10),
        ];
        for (field, value, min, max) in ranges {
            if value < min || value > max {
                return Err(ConfigurationError::ContainerHealthCheckOutOfRange {
                    container: container.to_string(),
                    field,
                    value,
                    min,
                    max,
                });
            }
        }

        Ok(check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(raw: &str) -> PortProtocol {
        PortProtocol::parse(raw).unwrap()
    }

    #[test]
    fn test_http_defaults() {
        let check = HealthCheck::resolve(&port("80/http"), None).unwrap();
        assert_eq!(check.path.as_deref(), Some("/"));
        assert_eq!(check.healthy_threshold, 5);
        assert_eq!(check.unhealthy_threshold, 2);
        assert_eq!(check.interval, Duration::from_secs(30));
        assert_eq!(check.timeout, Duration::from_secs(5));
        assert_eq!(check.success_codes.as_deref(), Some("200"));
    }

    #[test]
    fn test_tcp_defaults() {
        let check = HealthCheck::resolve(&port("5432/tcp"), None).unwrap();
        assert_eq!(check.path, None);
        assert_eq!(check.success_codes, None);
        assert_eq!(check.timeout, Duration::from_secs(6));
    }

    #[test]
    fn test_overrides_merge() {
        let args = HealthCheckArgs {
            path: Some("/healthz".to_string()),
            interval: Some("10 seconds".to_string()),
            ..Default::default()
        };
        let check = HealthCheck::resolve(&port("8080/http"), Some(&args)).unwrap();
        assert_eq!(check.path.as_deref(), Some("/healthz"));
        assert_eq!(check.interval, Duration::from_secs(10));
        assert_eq!(check.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_interval_out_of_range() {
        let args = HealthCheckArgs {
            interval: Some("10 minutes".to_string()),
            ..Default::default()
        };
        let result = HealthCheck::resolve(&port("80/http"), Some(&args));
        assert!(matches!(
            result,
            Err(ConfigurationError::HealthCheckOutOfRange { field: "interval", .. })
        ));
    }

    #[test]
    fn test_threshold_out_of_range() {
        let args = HealthCheckArgs {
            unhealthy_threshold: Some(1),
            ..Default::default()
        };
        let result = HealthCheck::resolve(&port("80/http"), Some(&args));
        assert!(matches!(
            result,
            Err(ConfigurationError::HealthCheckOutOfRange {
                field: "unhealthyThreshold",
                ..
            })
        ));
    }

    #[test]
    fn test_path_on_tcp_rejected() {
        let args = HealthCheckArgs {
            path: Some("/".to_string()),
            ..Default::default()
        };
        let result = HealthCheck::resolve(&port("5432/tcp"), Some(&args));
        assert!(matches!(result, Err(ConfigurationError::PathOnNetworkPort(_))));
    }

    #[test]
    fn test_container_health_defaults() {
        let args = ContainerHealthArgs {
            command: vec!["CMD-SHELL".into(), "exit 0".into()],
            ..Default::default()
        };
        let check = ContainerHealthCheck::resolve("app", &args).unwrap();
        assert_eq!(check.start_period, Duration::ZERO);
        assert_eq!(check.timeout, Duration::from_secs(5));
        assert_eq!(check.interval, Duration::from_secs(30));
        assert_eq!(check.retries, 3);
    }

    #[test]
    fn test_container_health_ranges() {
        let args = ContainerHealthArgs {
            command: vec!["CMD".into(), "true".into()],
            timeout: Some("90 seconds".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            ContainerHealthCheck::resolve("app", &args),
            Err(ConfigurationError::ContainerHealthCheckOutOfRange { field: "timeout", .. })
        ));

        let args = ContainerHealthArgs {
            command: vec!["CMD".into(), "true".into()],
            retries: Some(11),
            ..Default::default()
        };
        assert!(matches!(
            ContainerHealthCheck::resolve("app", &args),
            Err(ConfigurationError::ContainerHealthCheckOutOfRange { field: "retries", .. })
        ));
    }

    fn lb_args(field: &str, value: u64) -> HealthCheckArgs {
        let mut args = HealthCheckArgs::default();
        match field {
            "interval" => args.interval = Some(format!("{} seconds", value)),
            "timeout" => args.timeout = Some(format!("{} seconds", value)),
            "healthyThreshold" => args.healthy_threshold = Some(value as u32),
            _ => args.unhealthy_threshold = Some(value as u32),
        }
        args
    }

    #[test]
    fn test_load_balancer_range_boundaries() {
        let ranges = [
            ("interval", 5, 300),
            ("timeout", 2, 120),
            ("healthyThreshold", 2, 10),
            ("unhealthyThreshold", 2, 10),
        ];
        for (field, min, max) in ranges {
            for value in [min, max] {
                let result = HealthCheck::resolve(&port("80/http"), Some(&lb_args(field, value)));
                assert!(result.is_ok(), "{} = {} should be accepted", field, value);
            }
            for value in [min - 1, max + 1] {
                let result = HealthCheck::resolve(&port("80/http"), Some(&lb_args(field, value)));
                assert_eq!(
                    result,
                    Err(ConfigurationError::HealthCheckOutOfRange {
                        target: "80/http".to_string(),
                        field,
                        value,
                        min,
                        max,
                    })
                );
            }
        }
    }

    fn container_args(field: &str, value: u64) -> ContainerHealthArgs {
        let mut args = ContainerHealthArgs {
            command: vec!["CMD".into(), "true".into()],
            ..Default::default()
        };
        match field {
            "startPeriod" => args.start_period = Some(format!("{} seconds", value)),
            "timeout" => args.timeout = Some(format!("{} seconds", value)),
            "interval" => args.interval = Some(format!("{} seconds", value)),
            _ => args.retries = Some(value as u32),
        }
        args
    }

    #[test]
    fn test_container_range_boundaries() {
        let ranges = [
            ("startPeriod", 0, 300),
            ("timeout", 2, 60),
            ("interval", 5, 300),
            ("retries", 1, 10),
        ];
        for (field, min, max) in ranges {
            for value in [min, max] {
                let result = ContainerHealthCheck::resolve("app", &container_args(field, value));
                assert!(result.is_ok(), "{} = {} should be accepted", field, value);
            }
            let mut outside = vec![max + 1];
            if min > 0 {
                outside.push(min - 1);
            }
            for value in outside {
                let result = ContainerHealthCheck::resolve("app", &container_args(field, value));
                assert_eq!(
                    result,
                    Err(ConfigurationError::ContainerHealthCheckOutOfRange {
                        container: "app".to_string(),
                        field,
                        value,
                        min,
                        max,
                    })
                );
            }
        }
    }

    #[test]
    fn test_container_health_requires_command() {
        let result = ContainerHealthCheck::resolve("app", &ContainerHealthArgs::default());
        assert_eq!(
            result,
            Err(ConfigurationError::EmptyHealthCheckCommand("app".to_string()))
        );
    }
}
