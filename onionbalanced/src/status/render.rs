use chrono::{DateTime, Local, TimeZone, Utc};
use shared::protocol::{CHECK_TIME_FORMAT, NOT_UPLOADED, OFFLINE, ONION_SUFFIX, TIME_FORMAT};
use shared::types::{HealthStatus, Instance, Service};
use super::error::StatusError;

/// Render the status report as lines, in service then instance order.
///
/// The last element is always an empty terminator line.
pub fn render_lines(services: &[Service]) -> Result<Vec<String>, StatusError> {
    let mut lines = Vec::new();

    for service in services {
        let uploaded = match service.uploaded {
            Some(at) => format_timestamp(at),
            None => NOT_UPLOADED.to_string(),
        };
        lines.push(format!("{}{} {}", service.onion_address, ONION_SUFFIX, uploaded));

        let health_enabled = service.health_check_conf.is_enabled();
        for instance in &service.instances {
            lines.push(render_instance(instance, health_enabled)?);
        }
    }

    lines.push(String::new());
    Ok(lines)
}

/// Render the full report text, newline terminated.
pub fn render_status(services: &[Service]) -> Result<String, StatusError> {
    let mut report = render_lines(services)?.join("\n");
    // An empty report still carries its terminator
    if report.is_empty() {
        report.push('\n');
    }
    Ok(report)
}

fn render_instance(instance: &Instance, health_enabled: bool) -> Result<String, StatusError> {
    let Some(fetched_at) = instance.timestamp else {
        return Ok(format!("  {}{} {}", instance.onion_address, ONION_SUFFIX, OFFLINE));
    };

    let mut line = format!(
        "  {}{} {} {} IPs",
        instance.onion_address,
        ONION_SUFFIX,
        format_timestamp(fetched_at),
        instance.introduction_points
    );

    if health_enabled {
        let verdict = match instance.health {
            HealthStatus::Healthy => Some("up"),
            HealthStatus::Unhealthy => Some("down"),
            HealthStatus::Unknown => None,
        };
        if let Some(verdict) = verdict {
            let checked_at = format_check_time(instance.last_check_time)?;
            line.push_str(&format!(" [{} at {}]", verdict, checked_at));
        }
    }

    Ok(line)
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format(TIME_FORMAT).to_string()
}

fn format_check_time(epoch_secs: i64) -> Result<String, StatusError> {
    let checked_at = Local
        .timestamp_opt(epoch_secs, 0)
        .single()
        .ok_or(StatusError::InvalidTimestamp(epoch_secs))?;
    Ok(checked_at.format(CHECK_TIME_FORMAT).to_string())
}
