//! Line dispatch and command framing

use tracing::warn;

use super::classify::CommandCategory;
use crate::core::line::{Line, CR};

/// Two-character escape every outgoing adapter command starts with
pub const COMMAND_ESCAPE: &[u8; 2] = b"AT";

/// What the controller should do with a line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundAction {
    /// Set configuration field `key` to `value`
    ApplyParameter(String, String),
    /// Record a telemetry report
    LogTelemetry(String),
    /// Record an unhandled line (verbose mode only)
    LogDebug(String),
    NoOp,
}

/// Routes classified lines to actions
#[derive(Debug, Clone)]
pub struct Dispatcher {
    verbose: bool,
}

impl Dispatcher {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn dispatch(&self, category: CommandCategory, line: &Line<'_>) -> OutboundAction {
        match category {
            CommandCategory::Empty => OutboundAction::NoOp,
            CommandCategory::ParameterAssignment => {
                let text = line.text();
                match text.split_once('=') {
                    Some((key, value)) => {
                        OutboundAction::ApplyParameter(key.to_string(), value.to_string())
                    }
                    None => {
                        warn!("Malformed assignment dropped: {:?}", text);
                        OutboundAction::NoOp
                    }
                }
            }
            CommandCategory::TelemetryLine => OutboundAction::LogTelemetry(line.text().into_owned()),
            CommandCategory::ProtocolCommand => {
                if self.verbose {
                    OutboundAction::LogDebug(line.text().into_owned())
                } else {
                    OutboundAction::NoOp
                }
            }
        }
    }
}

/// Frame an adapter command for the wire: `AT` + payload + CR
pub fn frame_command(payload: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(COMMAND_ESCAPE.len() + payload.len() + 1);
    bytes.extend_from_slice(COMMAND_ESCAPE);
    bytes.extend_from_slice(payload.as_bytes());
    bytes.push(CR);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::classify;

    fn run(dispatcher: &Dispatcher, text: &str) -> OutboundAction {
        let line = Line::new(text.as_bytes());
        dispatcher.dispatch(classify(&line), &line)
    }

    #[test]
    fn test_assignment_splits_on_first_equals() {
        let dispatcher = Dispatcher::new(false);
        assert_eq!(
            run(&dispatcher, "speed=55"),
            OutboundAction::ApplyParameter("speed".into(), "55".into())
        );
        assert_eq!(
            run(&dispatcher, "identity=a=b"),
            OutboundAction::ApplyParameter("identity".into(), "a=b".into())
        );
        assert_eq!(
            run(&dispatcher, "ssid="),
            OutboundAction::ApplyParameter("ssid".into(), String::new())
        );
    }

    #[test]
    fn test_malformed_assignment_is_dropped() {
        let dispatcher = Dispatcher::new(true);
        let line = Line::new(b"no equals here");
        assert_eq!(
            dispatcher.dispatch(CommandCategory::ParameterAssignment, &line),
            OutboundAction::NoOp
        );
    }

    #[test]
    fn test_telemetry() {
        let dispatcher = Dispatcher::new(false);
        assert_eq!(
            run(&dispatcher, "12,34,56"),
            OutboundAction::LogTelemetry("12,34,56".into())
        );
    }

    #[test]
    fn test_protocol_command_needs_verbose() {
        let quiet = Dispatcher::new(false);
        assert_eq!(run(&quiet, "ATZ"), OutboundAction::NoOp);

        let verbose = Dispatcher::new(true);
        assert_eq!(run(&verbose, "ATZ"), OutboundAction::LogDebug("ATZ".into()));
    }

    #[test]
    fn test_empty_line() {
        assert_eq!(run(&Dispatcher::new(true), ""), OutboundAction::NoOp);
    }

    #[test]
    fn test_frame_command() {
        assert_eq!(frame_command("Z"), vec![b'A', b'T', b'Z', 13]);
        assert_eq!(frame_command("SP0"), b"ATSP0\r".to_vec());
        assert_eq!(frame_command(""), b"AT\r".to_vec());
    }
}
