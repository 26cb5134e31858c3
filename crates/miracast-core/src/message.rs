//! wpa_supplicant control-protocol codec.
//!
//! The control socket carries line-oriented UTF-8 text in three shapes:
//! requests we send (`P2P_CONNECT <addr> pbc`), the synchronous reply to the
//! request in flight (`OK`, `FAIL ...`, or an opaque payload returned
//! verbatim), and unsolicited events. Events carry a single-character
//! priority prefix in angle brackets (`<3>P2P-DEVICE-FOUND ...`) which the
//! parser strips before exposing the event name.
//!
//! Argument tokens may be bare, quoted (`name='Aquaris M10'`), or
//! `key=value` pairs. The [`Reader`] gives positional access with an
//! explicit skip, plus order-independent `key=value` lookup over the
//! remainder. Unknown trailing fields are never an error.

use thiserror::Error;

/// Errors raised while parsing a message or reading its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("missing field: {0}")]
    MissingField(String),

    #[error("field {field} has ill-typed value {value:?}")]
    IllTyped { field: String, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// A command we send to the supplicant.
    Request,
    /// The synchronous answer to the request in flight.
    Reply,
    /// An unsolicited notification, recognized by its `<N>` prefix.
    Event,
}

/// A single control-protocol message.
///
/// The original wire text (minus any trailing newline) is retained, so
/// re-serializing a parsed message is byte-identical to its input.
#[derive(Debug, Clone)]
pub struct Message {
    raw: String,
    kind: MessageKind,
    name: String,
    args: Vec<String>,
}

impl Message {
    /// Parse a datagram received from the supplicant.
    ///
    /// Anything with a `<N>` priority prefix is an event; everything else is
    /// classified as the reply to the request in flight.
    pub fn parse(input: &str) -> Result<Message, CodecError> {
        let raw = input.trim_end_matches(['\r', '\n']);
        if raw.is_empty() {
            return Err(CodecError::Malformed("empty message".into()));
        }

        if let Some(rest) = raw.strip_prefix('<') {
            let close = rest
                .find('>')
                .ok_or_else(|| CodecError::Malformed(format!("unterminated priority prefix: {raw:?}")))?;
            if close != 1 {
                return Err(CodecError::Malformed(format!("bad priority prefix: {raw:?}")));
            }

            let mut tokens = tokenize(&rest[close + 1..]);
            if tokens.is_empty() {
                return Err(CodecError::Malformed("event without a name".into()));
            }
            let name = tokens.remove(0);

            return Ok(Message {
                raw: raw.to_string(),
                kind: MessageKind::Event,
                name,
                args: tokens,
            });
        }

        Ok(Message {
            raw: raw.to_string(),
            kind: MessageKind::Reply,
            name: String::new(),
            args: tokenize(raw),
        })
    }

    /// Start building a request from its command token.
    pub fn request(name: &str) -> Message {
        Message {
            raw: name.to_string(),
            kind: MessageKind::Request,
            name: name.to_string(),
            args: Vec::new(),
        }
    }

    /// Append a string argument, quoting it when it contains whitespace.
    pub fn arg(self, value: &str) -> Message {
        let needs_quoting = value.chars().any(char::is_whitespace);
        if needs_quoting {
            self.push_token(format!("'{value}'"))
        } else {
            self.push_token(value.to_string())
        }
    }

    /// Append a signed integer argument.
    pub fn arg_int(self, value: i64) -> Message {
        self.push_token(value.to_string())
    }

    /// Append an unsigned integer argument.
    pub fn arg_uint(self, value: u64) -> Message {
        self.push_token(value.to_string())
    }

    fn push_token(mut self, token: String) -> Message {
        self.raw.push(' ');
        self.raw.push_str(&token);
        self.args.push(token);
        self
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// The command token of a request or the name of an event. Empty for replies.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The wire form of this message.
    pub fn as_raw(&self) -> &str {
        &self.raw
    }

    /// True for the canonical `OK` reply.
    pub fn is_ok(&self) -> bool {
        self.kind == MessageKind::Reply && self.raw == "OK"
    }

    /// True for any reply whose body starts with `FAIL`.
    pub fn is_fail(&self) -> bool {
        self.kind == MessageKind::Reply && self.raw.starts_with("FAIL")
    }

    /// A cursor over the argument list.
    pub fn reader(&self) -> Reader<'_> {
        Reader { args: &self.args, pos: 0 }
    }
}

/// Cursor over a message's arguments.
///
/// Positional reads consume tokens left to right; [`Reader::named`] searches
/// the unconsumed remainder for a `key=value` pair regardless of order.
#[derive(Debug)]
pub struct Reader<'a> {
    args: &'a [String],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Skip the next positional field.
    pub fn skip(&mut self) -> Result<&mut Self, CodecError> {
        if self.pos >= self.args.len() {
            return Err(CodecError::Malformed("skip past end of message".into()));
        }
        self.pos += 1;
        Ok(self)
    }

    /// Read the next positional field as a string, unquoting if necessary.
    pub fn next_str(&mut self) -> Result<&'a str, CodecError> {
        let token = self
            .args
            .get(self.pos)
            .ok_or_else(|| CodecError::MissingField(format!("positional #{}", self.pos)))?;
        self.pos += 1;
        Ok(unquote(token))
    }

    /// Read the next positional field as an unsigned decimal integer.
    pub fn next_uint(&mut self) -> Result<u64, CodecError> {
        let value = self.next_str()?;
        value.parse().map_err(|_| CodecError::IllTyped {
            field: format!("positional #{}", self.pos - 1),
            value: value.to_string(),
        })
    }

    /// Find `key=value` anywhere in the unconsumed remainder.
    pub fn named(&self, key: &str) -> Result<&'a str, CodecError> {
        for token in &self.args[self.pos.min(self.args.len())..] {
            if let Some(value) = token.strip_prefix(key).and_then(|rest| rest.strip_prefix('=')) {
                return Ok(unquote(value));
            }
        }
        Err(CodecError::MissingField(key.to_string()))
    }

    /// Named field holding a hexadecimal integer, with or without `0x`.
    pub fn named_hex(&self, key: &str) -> Result<u64, CodecError> {
        let value = self.named(key)?;
        let digits = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")).unwrap_or(value);
        u64::from_str_radix(digits, 16).map_err(|_| CodecError::IllTyped {
            field: key.to_string(),
            value: value.to_string(),
        })
    }

    /// Named field holding hex-encoded bytes, with or without `0x`.
    pub fn named_bytes(&self, key: &str) -> Result<Vec<u8>, CodecError> {
        let value = self.named(key)?;
        let digits = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")).unwrap_or(value);
        hex::decode(digits).map_err(|_| CodecError::IllTyped {
            field: key.to_string(),
            value: value.to_string(),
        })
    }
}

/// Split on whitespace, keeping quoted runs (single or double) intact.
/// Quotes are retained in the token and removed on read.
fn tokenize(input: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match quote {
            Some(open) => {
                current.push(c);
                if c == open {
                    quote = None;
                }
            }
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                current.push(c);
            }
            None if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            None => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn unquote(token: &str) -> &str {
    let bytes = token.as_bytes();
    if bytes.len() >= 2 && (bytes[0] == b'\'' || bytes[0] == b'"') && bytes[bytes.len() - 1] == bytes[0] {
        &token[1..token.len() - 1]
    } else {
        token
    }
}
