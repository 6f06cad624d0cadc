//! Inbound SMS handling.
//!
//! The gateway forwards every received SMS as a sender number plus a base64
//! body. Bodies starting with [`COMMAND_PREFIX`] are tokenised and dispatched
//! through the [`CommandTable`]; anything else is only logged. Whatever
//! happens, the gateway gets an acknowledgement string back.

pub mod commands;
pub mod outbox;

use std::sync::Arc;

use base64::Engine;
use tracing::{info, warn};

use crate::vehicle::Vehicle;

pub use commands::{CommandTable, Context, Handler};
pub use outbox::{Outbox, SmsError};

/// Marks an SMS body as a command.
pub const COMMAND_PREFIX: &str = "!!";

/// Acknowledgement for a handled (or ignored) message.
pub const ACK: &str = "Thanks";
/// Acknowledgement while SMS handling is disabled.
pub const ACK_DISABLED: &str = "DISABLED";
/// Acknowledgement for a body that is not base64-encoded UTF-8.
pub const ACK_INVALID: &str = "INVALID";

/// Why an SMS body could not be turned into text.
#[derive(Debug)]
pub enum DecodeError {
    Base64(base64::DecodeError),
    Utf8(std::string::FromUtf8Error),
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Base64(e) => write!(f, "bad base64: {e}"),
            DecodeError::Utf8(e) => write!(f, "bad UTF-8: {e}"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Decode a base64 SMS body and trim surrounding whitespace.
pub fn decode_body(body: &str) -> Result<String, DecodeError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(body.trim())
        .map_err(DecodeError::Base64)?;
    let text = String::from_utf8(bytes).map_err(DecodeError::Utf8)?;
    Ok(text.trim().to_string())
}

/// Result of interpreting one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Not a command; nothing was sent to the vehicle.
    Ignored,
    /// Command handled without a reply.
    Done,
    /// Command handled; this text goes back to the sender.
    Reply(String),
}

/// Turns SMS text into vehicle commands.
pub struct Interpreter {
    vehicle: Arc<dyn Vehicle>,
    commands: CommandTable,
}

impl Interpreter {
    pub fn new(vehicle: Arc<dyn Vehicle>) -> Self {
        Self {
            vehicle,
            commands: CommandTable::new(),
        }
    }

    /// Interpret already-decoded text from `sender`.
    pub fn interpret(&self, sender: &str, text: &str) -> Outcome {
        let Some(rest) = text.strip_prefix(COMMAND_PREFIX) else {
            return Outcome::Ignored;
        };
        let tokens: Vec<&str> = rest.split_whitespace().collect();
        let Some((keyword, args)) = tokens.split_first() else {
            return Outcome::Ignored;
        };

        let command = keyword.to_lowercase();
        let reply = match self.commands.get(&command) {
            Some(handler) => {
                let ctx = Context {
                    vehicle: self.vehicle.as_ref(),
                    sender,
                    command: &command,
                };
                handler(&ctx, args)
            }
            None => Some(format!("Unknown command {command}")),
        };
        reply.map_or(Outcome::Done, Outcome::Reply)
    }
}

/// Full inbound path: decode, interpret, reply. Returns the acknowledgement
/// for the gateway.
pub async fn handle(
    interpreter: &Interpreter,
    outbox: &Outbox,
    enabled: bool,
    sender: &str,
    body: &str,
) -> &'static str {
    if !enabled {
        return ACK_DISABLED;
    }

    let text = match decode_body(body) {
        Ok(text) => text,
        Err(e) => {
            warn!("SMS from {sender}: {e}");
            return ACK_INVALID;
        }
    };
    info!("SMS from {sender}: {text}");

    if let Outcome::Reply(reply) = interpreter.interpret(sender, &text) {
        if let Err(e) = outbox.send(sender, &reply).await {
            warn!("SMS reply to {sender} failed: {e}");
        }
    }
    ACK
}
