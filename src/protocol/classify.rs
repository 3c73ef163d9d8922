//! Line classification

use crate::core::line::Line;

/// Reserved prefix of adapter commands that carry `=` themselves
pub const COMMAND_PREFIX: &[u8; 4] = b"AT+i";

/// What kind of line was received
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandCategory {
    Empty,
    /// `key=value` from a configuration surface
    ParameterAssignment,
    /// Comma-delimited status report
    TelemetryLine,
    /// Anything else, treated as an AT-style adapter command
    ProtocolCommand,
}

/// Classify a completed line.
///
/// Order matters: a line holding both `=` and `,` is an assignment.
pub fn classify(line: &Line<'_>) -> CommandCategory {
    if line.is_empty() {
        CommandCategory::Empty
    } else if line.contains(b'=') && !line.starts_with(COMMAND_PREFIX) {
        CommandCategory::ParameterAssignment
    } else if line.contains(b',') {
        CommandCategory::TelemetryLine
    } else {
        CommandCategory::ProtocolCommand
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(text: &str) -> CommandCategory {
        classify(&Line::new(text.as_bytes()))
    }

    #[test]
    fn test_basic_categories() {
        assert_eq!(category("speed=55"), CommandCategory::ParameterAssignment);
        assert_eq!(category("12,34,56"), CommandCategory::TelemetryLine);
        assert_eq!(category("ATZ"), CommandCategory::ProtocolCommand);
        assert_eq!(category(""), CommandCategory::Empty);
    }

    #[test]
    fn test_assignment_wins_over_telemetry() {
        assert_eq!(category("pids=1,2,3"), CommandCategory::ParameterAssignment);
    }

    #[test]
    fn test_prefixed_command_is_not_assignment() {
        assert_eq!(category("AT+iSSID=home"), CommandCategory::ProtocolCommand);
        assert_eq!(category("AT+iRP=1,2"), CommandCategory::TelemetryLine);
        // prefix is case sensitive
        assert_eq!(category("at+iSSID=home"), CommandCategory::ParameterAssignment);
    }

    #[test]
    fn test_single_separator() {
        assert_eq!(category("="), CommandCategory::ParameterAssignment);
        assert_eq!(category(","), CommandCategory::TelemetryLine);
    }
}
