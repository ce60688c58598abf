// libs/appointment-cell/src/services/status.rs
use crate::models::AppointmentStatus;

/// Stored label -> API code. Values outside the enumeration pass through.
pub fn to_external(internal: &str) -> String {
    AppointmentStatus::from_label(internal)
        .map(|s| s.code().to_string())
        .unwrap_or_else(|| internal.to_string())
}

/// API code -> stored label. Values outside the enumeration pass through.
pub fn to_internal(external: &str) -> String {
    AppointmentStatus::from_code(external)
        .map(|s| s.label().to_string())
        .unwrap_or_else(|| external.to_string())
}

/// Resolves a filter value given in either vocabulary to its stored label.
pub fn parse_status_filter(value: &str) -> Option<AppointmentStatus> {
    AppointmentStatus::from_code(value).or_else(|| AppointmentStatus::from_label(value))
}
