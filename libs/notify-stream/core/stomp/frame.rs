//! STOMP 1.2 frame codec
//!
//! ```text
//! COMMAND\n
//! header1:value1\n
//! header2:value2\n
//! \n
//! body^@
//! ```
//!
//! A WebSocket message holds one or more frames; a message made only of
//! EOLs is a heart-beat.

use crate::traits::*;

/// Something decoded from one WebSocket message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StompInbound {
    Heartbeat,
    Frame(StompFrame),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl StompFrame {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
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

    /// First value of a header; STOMP gives the first occurrence precedence
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// CONNECT and CONNECTED headers are never escaped
    fn escapes_headers(command: &str) -> bool {
        command != "CONNECT" && command != "CONNECTED"
    }

    pub fn encode(&self) -> String {
        let escape = Self::escapes_headers(&self.command);
        let mut out = String::with_capacity(self.command.len() + self.body.len() + 64);
        out.push_str(&self.command);
        out.push('\n');
        for (name, value) in &self.headers {
            if escape {
                out.push_str(&escape_header(name));
                out.push(':');
                out.push_str(&escape_header(value));
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

    /// Decode every frame (and heart-beat) in one WebSocket message
    pub fn decode(message: &str) -> Result<Vec<StompInbound>> {
        let mut items = Vec::new();
        let mut rest = message;

        loop {
            let trimmed = rest.trim_start_matches(['\r', '\n']);
            if trimmed.len() != rest.len() && trimmed.is_empty() && items.is_empty() {
                items.push(StompInbound::Heartbeat);
            }
            rest = trimmed;
            if rest.is_empty() {
                break;
            }

            let (frame, remaining) = Self::decode_one(rest)?;
            items.push(StompInbound::Frame(frame));
            rest = remaining;
        }

        Ok(items)
    }

    fn decode_one(input: &str) -> Result<(StompFrame, &str)> {
        let (command, mut rest) = split_line(input)
            .ok_or_else(|| NotifyError::ProtocolError("STOMP frame without a command line".to_string()))?;
        let command = command.to_string();
        let unescape = Self::escapes_headers(&command);

        let mut headers = Vec::new();
        loop {
            let (line, remaining) = split_line(rest).ok_or_else(|| {
                NotifyError::ProtocolError(format!("STOMP {} frame has unterminated headers", command))
            })?;
            rest = remaining;
            if line.is_empty() {
                break;
            }
            let (name, value) = line.split_once(':').ok_or_else(|| {
                NotifyError::ProtocolError(format!("malformed STOMP header '{}'", line))
            })?;
            if unescape {
                headers.push((unescape_header(name)?, unescape_header(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(name, _)| name == "content-length")
            .and_then(|(_, value)| value.trim().parse::<usize>().ok());

        let (body, remaining) = match content_length {
            Some(len) if rest.len() > len && rest.is_char_boundary(len) => {
                let (body, tail) = rest.split_at(len);
                let tail = tail.strip_prefix('\0').ok_or_else(|| {
                    NotifyError::ProtocolError("STOMP body longer than content-length".to_string())
                })?;
                (body, tail)
            }
            _ => {
                let end = rest.find('\0').ok_or_else(|| {
                    NotifyError::ProtocolError(format!("STOMP {} frame missing NUL terminator", command))
                })?;
                (&rest[..end], &rest[end + 1..])
            }
        };

        Ok((
            StompFrame {
                command,
                headers,
                body: body.to_string(),
            },
            remaining,
        ))
    }
}

/// Split off one EOL-terminated line (`\n` or `\r\n`)
fn split_line(input: &str) -> Option<(&str, &str)> {
    let pos = input.find('\n')?;
    let line = input[..pos].strip_suffix('\r').unwrap_or(&input[..pos]);
    Some((line, &input[pos + 1..]))
}

fn escape_header(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            ':' => out.push_str("\\c"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_header(value: &str) -> Result<String> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('r') => out.push('\r'),
            Some('n') => out.push('\n'),
            Some('c') => out.push(':'),
            other => {
                return Err(NotifyError::ProtocolError(format!(
                    "invalid STOMP header escape '\\{}'",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_connect_is_not_escaped() {
        let frame = StompFrame::new("CONNECT")
            .header("accept-version", "1.2,1.1,1.0")
            .header("heart-beat", "4000,4000");
        assert_eq!(
            frame.encode(),
            "CONNECT\naccept-version:1.2,1.1,1.0\nheart-beat:4000,4000\n\n\0"
        );
    }

    #[test]
    fn test_decode_message() {
        let raw = "MESSAGE\ndestination:/user/queue/notifications\nsubscription:sub-0\n\n{\"id\":1}\0";
        let items = StompFrame::decode(raw).unwrap();
        assert_eq!(items.len(), 1);
        match &items[0] {
            StompInbound::Frame(frame) => {
                assert_eq!(frame.command, "MESSAGE");
                assert_eq!(frame.get("destination"), Some("/user/queue/notifications"));
                assert_eq!(frame.body, "{\"id\":1}");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_heartbeat() {
        assert_eq!(StompFrame::decode("\n").unwrap(), vec![StompInbound::Heartbeat]);
        assert_eq!(StompFrame::decode("\r\n").unwrap(), vec![StompInbound::Heartbeat]);
    }

    #[test]
    fn test_content_length_body_may_contain_nul() {
        let raw = "MESSAGE\ncontent-length:3\n\na\0b\0";
        match &StompFrame::decode(raw).unwrap()[0] {
            StompInbound::Frame(frame) => assert_eq!(frame.body, "a\0b"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_header_escapes_roundtrip() {
        let frame = StompFrame::new("SEND").header("note", "a:b\\c\nd");
        let encoded = frame.encode();
        assert!(encoded.contains("note:a\\cb\\\\c\\nd\n"));
        match &StompFrame::decode(&encoded).unwrap()[0] {
            StompInbound::Frame(decoded) => assert_eq!(decoded, &frame),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_two_frames_in_one_message() {
        let raw = "RECEIPT\nreceipt-id:1\n\n\0\nERROR\nmessage:bad\n\n\0";
        let items = StompFrame::decode(raw).unwrap();
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_missing_terminator_is_error() {
        assert!(StompFrame::decode("MESSAGE\n\nbody").is_err());
    }
}
