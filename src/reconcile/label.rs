//! Subscription label derivation.

/// Display description for a message type name.
///
/// Strips assembly qualification (everything after the first comma), then
/// the namespace (everything up to the last dot). A name that reduces to
/// nothing falls back to the raw identifier.
pub fn describe_message(message_name: &str, correlation_id: Option<&str>) -> String {
    let type_name = message_name.split(',').next().unwrap_or(message_name);
    let short = type_name.rsplit('.').next().unwrap_or(type_name).trim();

    let mut description = if short.is_empty() {
        message_name.to_string()
    } else {
        short.to_string()
    };

    if let Some(id) = correlation_id.filter(|id| !id.is_empty()) {
        description.push_str(" (");
        description.push_str(id);
        description.push(')');
    }

    description
}

/// Whether a message type belongs to the bus infrastructure itself.
pub fn is_system_message(message_name: &str, system_namespace: &str) -> bool {
    if system_namespace.is_empty() {
        return false;
    }
    let type_name = message_name.split(',').next().unwrap_or(message_name);
    type_name.trim_start().starts_with(system_namespace)
}
