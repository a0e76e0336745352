//! STOMP 1.2 frame codec.
//!
//! Frames travel as WebSocket text messages:
//!
//! ```text
//! COMMAND
//! header1:value1
//! header2:value2
//!
//! body^@
//! ```
//!
//! Header values are escaped (`\\`, `\n`, `\r`, `\c`) except in `CONNECT` and
//! `CONNECTED` frames. A message consisting only of EOLs is a heart-beat.

use std::{fmt, str::FromStr};

use thiserror::Error;

/// STOMP protocol version requested on connect.
pub const ACCEPT_VERSION: &str = "1.2";

/// Errors while decoding a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StompError {
    #[error("unknown STOMP command '{0}'")]
    UnknownCommand(String),

    #[error("malformed header line '{0}'")]
    MalformedHeader(String),

    #[error("invalid escape sequence in header '{0}'")]
    InvalidEscape(String),

    #[error("frame has no blank line after its headers")]
    MissingHeaderTerminator,

    #[error("frame body is not NULL-terminated")]
    MissingNullTerminator,

    #[error("frame body is shorter than its content-length")]
    TruncatedBody,
}

/// STOMP commands used by the candidate channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StompCommand {
    Connect,
    Connected,
    Subscribe,
    Unsubscribe,
    Send,
    Message,
    Error,
    Disconnect,
}

impl StompCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            StompCommand::Connect => "CONNECT",
            StompCommand::Connected => "CONNECTED",
            StompCommand::Subscribe => "SUBSCRIBE",
            StompCommand::Unsubscribe => "UNSUBSCRIBE",
            StompCommand::Send => "SEND",
            StompCommand::Message => "MESSAGE",
            StompCommand::Error => "ERROR",
            StompCommand::Disconnect => "DISCONNECT",
        }
    }

    fn escapes_headers(&self) -> bool {
        !matches!(self, StompCommand::Connect | StompCommand::Connected)
    }
}

impl FromStr for StompCommand {
    type Err = StompError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" | "STOMP" => Ok(StompCommand::Connect),
            "CONNECTED" => Ok(StompCommand::Connected),
            "SUBSCRIBE" => Ok(StompCommand::Subscribe),
            "UNSUBSCRIBE" => Ok(StompCommand::Unsubscribe),
            "SEND" => Ok(StompCommand::Send),
            "MESSAGE" => Ok(StompCommand::Message),
            "ERROR" => Ok(StompCommand::Error),
            "DISCONNECT" => Ok(StompCommand::Disconnect),
            other => Err(StompError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for StompCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: StompCommand,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl StompFrame {
    pub fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of the named header; repeated headers keep the first occurrence.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// `CONNECT` frame, authenticated with a bearer token when one is given.
    pub fn connect(host: &str, access_token: Option<&str>) -> Self {
        let frame = Self::new(StompCommand::Connect)
            .header("accept-version", ACCEPT_VERSION)
            .header("host", host)
            .header("heart-beat", "0,0");
        match access_token {
            Some(token) => frame.header("Authorization", format!("Bearer {}", token)),
            None => frame,
        }
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(StompCommand::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Self::new(StompCommand::Unsubscribe).header("id", id)
    }

    pub fn send(destination: &str, json_body: impl Into<String>) -> Self {
        Self::new(StompCommand::Send)
            .header("destination", destination)
            .header("content-type", "application/json")
            .body(json_body)
    }

    pub fn disconnect() -> Self {
        Self::new(StompCommand::Disconnect)
    }

    /// Serialize the frame to its wire text.
    pub fn encode(&self) -> String {
        let escape_headers = self.command.escapes_headers();
        let mut out = String::with_capacity(32 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (name, value) in &self.headers {
            if escape_headers {
                out.push_str(&escape(name));
                out.push(':');
                out.push_str(&escape(value));
            } else {
                out.push_str(name);
                out.push(':');
                out.push_str(value);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse one frame from wire text.
    ///
    /// Returns `Ok(None)` for heart-beats.
    pub fn decode(raw: &str) -> Result<Option<Self>, StompError> {
        let trimmed = raw.trim_start_matches(['\r', '\n']);
        if trimmed.is_empty() || trimmed == "\0" {
            return Ok(None);
        }

        let (head, rest) = split_head(trimmed).ok_or(StompError::MissingHeaderTerminator)?;
        let mut lines = head.lines();
        let command: StompCommand = lines.next().unwrap_or_default().parse()?;
        let unescape_headers = command.escapes_headers();

        let mut headers: Vec<(String, String)> = Vec::new();
        for line in lines {
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| StompError::MalformedHeader(line.to_string()))?;
            let (name, value) = if unescape_headers {
                (unescape(name)?, unescape(value)?)
            } else {
                (name.to_string(), value.to_string())
            };
            if !headers.iter().any(|(existing, _)| *existing == name) {
                headers.push((name, value));
            }
        }

        let content_length = headers
            .iter()
            .find(|(name, _)| name == "content-length")
            .and_then(|(_, value)| value.trim().parse::<usize>().ok());
        let body = match content_length {
            Some(len) => rest.get(..len).ok_or(StompError::TruncatedBody)?,
            None => {
                let end = rest.find('\0').ok_or(StompError::MissingNullTerminator)?;
                &rest[..end]
            }
        };

        Ok(Some(Self {
            command,
            headers,
            body: body.to_string(),
        }))
    }
}

fn split_head(frame: &str) -> Option<(&str, &str)> {
    let lf = frame.find("\n\n").map(|i| (i, 2));
    let crlf = frame.find("\r\n\r\n").map(|i| (i, 4));
    let (index, width) = match (lf, crlf) {
        (Some(a), Some(b)) => {
            if a.0 <= b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    Some((&frame[..index], &frame[index + width..]))
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(value: &str) -> Result<String, StompError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(StompError::InvalidEscape(value.to_string())),
        }
    }
    Ok(out)
}
