//! Display formatting for CLI output
//!
//! SBIO pattern: Pure functions that format data for display

use super::commands::{PlanReport, ValidationReport};
use crate::config::{ImageSource, NormalizedService, PortAction};

// ============================================================================
// Table formatting helpers
// ============================================================================

/// Format a simple table with headers and rows
pub fn format_table(headers: &[&str], rows: Vec<Vec<String>>) -> String {
    if rows.is_empty() {
        return "No resources found.\n".to_string();
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut output = String::new();

    for (i, header) in headers.iter().enumerate() {
        if i > 0 {
            output.push_str("   ");
        }
        output.push_str(&format!("{:width$}", header.to_uppercase(), width = widths[i]));
    }
    output.push('\n');

    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i > 0 {
                output.push_str("   ");
            }
            if i < widths.len() {
                output.push_str(&format!("{:width$}", cell, width = widths[i]));
            } else {
                output.push_str(cell);
            }
        }
        output.push('\n');
    }

    output
}

// ============================================================================
// Validation display
// ============================================================================

fn describe_ports(service: &NormalizedService) -> String {
    let Some(lb) = &service.load_balancer else {
        return "-".to_string();
    };
    lb.ports
        .iter()
        .map(|port| {
            let path = port.path.as_deref().unwrap_or("");
            match &port.action {
                PortAction::Forward { to, container } if service.containers.len() > 1 => {
                    format!("{}{} -> {}:{}", port.listen, path, container, to)
                }
                PortAction::Forward { to, .. } => format!("{}{} -> {}", port.listen, path, to),
                PortAction::Redirect { to } => format!("{}{} => {}", port.listen, path, to),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Format normalized services for display
pub fn format_validation(report: &ValidationReport) -> String {
    let headers = &["SERVICE", "CPU", "MEMORY", "CONTAINERS", "SCALING", "PORTS"];
    let rows: Vec<Vec<String>> = report
        .services
        .iter()
        .map(|service| {
            vec![
                service.name.clone(),
                service.cpu.to_string(),
                service.memory.to_string(),
                service
                    .containers
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
                format!("{}-{}", service.scaling.min, service.scaling.max),
                describe_ports(service),
            ]
        })
        .collect();

    let mut output = format!("✓ Cluster '{}' is valid\n\n", report.cluster);
    output.push_str(&format_table(headers, rows));

    let builds: Vec<String> = report
        .services
        .iter()
        .flat_map(|s| {
            s.containers.iter().filter_map(move |c| match &c.image {
                ImageSource::Build { context, .. } => {
                    Some(format!("  {}/{}: build from {}", s.name, c.name, context))
                }
                ImageSource::Tag { .. } => None,
            })
        })
        .collect();
    if !builds.is_empty() {
        output.push_str("\nImages built from source:\n");
        for line in builds {
            output.push_str(&line);
            output.push('\n');
        }
    }

    output
}

// ============================================================================
// Plan display
// ============================================================================

/// Format a plan as an ordered list of resource calls
pub fn format_plan(report: &PlanReport) -> String {
    let mut output = format!(
        "Cluster '{}' (layout v{}): {} resource(s)\n\n",
        report.cluster,
        report.layout_version,
        report.calls.len()
    );

    let rows: Vec<Vec<String>> = report
        .calls
        .iter()
        .enumerate()
        .map(|(i, call)| {
            vec![
                (i + 1).to_string(),
                call.kind.to_string(),
                call.name.clone(),
                call.depends_on.join(","),
            ]
        })
        .collect();
    output.push_str(&format_table(&["#", "KIND", "NAME", "DEPENDS ON"], rows));

    if !report.services.is_empty() {
        output.push('\n');
        let rows: Vec<Vec<String>> = report
            .services
            .iter()
            .map(|s| {
                vec![
                    s.name.clone(),
                    s.resources.to_string(),
                    s.load_balancer.clone().unwrap_or_else(|| "-".to_string()),
                    s.url
                        .clone()
                        .or_else(|| s.hostname.clone())
                        .unwrap_or_else(|| "-".to_string()),
                ]
            })
            .collect();
        output.push_str(&format_table(
            &["SERVICE", "RESOURCES", "LOAD BALANCER", "ENDPOINT"],
            rows,
        ));
    }

    output
}
