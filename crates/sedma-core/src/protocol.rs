//! Line protocol codec.
//!
//! One line is `TYPE CMD [key=value ...]`, tokens separated by ASCII
//! whitespace. This module only parses a line into a structured [`Message`]
//! and looks values up by key; framing (where lines come from, buffer caps)
//! is the transport's job, not the codec's.

use std::fmt;

/// Command token cap, in bytes.
pub const MAX_CMD_LEN: usize = 31;
/// Key token cap, in bytes.
pub const MAX_KEY_LEN: usize = 31;
/// Value token cap, in bytes (values beyond this are truncated, not rejected).
pub const MAX_VALUE_LEN: usize = 127;
/// Maximum number of key=value pairs parsed from one line.
pub const MAX_PAIRS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    Req,
    Resp,
    Evt,
    Err,
}

impl MsgType {
    fn parse(s: &str) -> Option<MsgType> {
        match s {
            "REQ" => Some(MsgType::Req),
            "RESP" => Some(MsgType::Resp),
            "EVT" => Some(MsgType::Evt),
            "ERR" => Some(MsgType::Err),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MsgType::Req => "REQ",
            MsgType::Resp => "RESP",
            MsgType::Evt => "EVT",
            MsgType::Err => "ERR",
        }
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single parsed protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub msg_type: MsgType,
    pub cmd: String,
    pairs: Vec<(String, String)>,
}

impl Message {
    /// Looks up the first value for `key`, or `"not found"` if absent —
    /// matching the sentinel `proto_get` returns on a miss.
    pub fn get(&self, key: &str) -> &str {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .unwrap_or("not found")
    }

    /// Like [`Message::get`] but `None` on a miss, for call sites that need
    /// to distinguish "absent" from a literal value of `"not found"`.
    pub fn try_get(&self, key: &str) -> Option<&str> {
        self.pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

/// Parse error: the line could not be framed into a [`Message`] at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtoBad;

/// Parses one already-delimited line (no trailing `\n`/`\r`) into a
/// [`Message`].
///
/// A line with only a type and a command and no pairs is valid. Parsing
/// fails only when the type or command tokens are missing, or the type is
/// unrecognised.
pub fn parse(line: &str) -> Result<Message, ProtoBad> {
    let mut tokens = line.split_ascii_whitespace();

    let msg_type = tokens.next().and_then(MsgType::parse).ok_or(ProtoBad)?;
    let cmd_raw = tokens.next().ok_or(ProtoBad)?;
    let cmd = truncate(cmd_raw, MAX_CMD_LEN).to_string();

    let mut pairs = Vec::new();
    for token in tokens {
        if pairs.len() >= MAX_PAIRS {
            break;
        }
        let Some((key, value)) = token.split_once('=') else {
            continue;
        };
        if key.is_empty() || key.len() >= 32 {
            continue;
        }
        let key = truncate(key, MAX_KEY_LEN).to_string();
        let value = truncate(value, MAX_VALUE_LEN).to_string();
        pairs.push((key, value));
    }

    Ok(Message { msg_type, cmd, pairs })
}

fn truncate(s: &str, max_len: usize) -> &str {
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Builds a `key=value` token, truncating the value like the parser does, so
/// round-tripping a built line never produces a token the parser would then
/// mangle on re-parse.
pub fn kv(key: &str, value: impl fmt::Display) -> String {
    format!("{}={}", key, truncate(&value.to_string(), MAX_VALUE_LEN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_type_and_command_only() {
        let msg = parse("REQ PING").unwrap();
        assert_eq!(msg.msg_type, MsgType::Req);
        assert_eq!(msg.cmd, "PING");
        assert!(msg.pairs().is_empty());
    }

    #[test]
    fn parses_key_value_pairs() {
        let msg = parse("REQ LOGIN nick=alice").unwrap();
        assert_eq!(msg.get("nick"), "alice");
        assert_eq!(msg.get("missing"), "not found");
    }

    #[test]
    fn rejects_missing_type_or_command() {
        assert_eq!(parse(""), Err(ProtoBad));
        assert_eq!(parse("REQ"), Err(ProtoBad));
        assert_eq!(parse("WUT LOGIN"), Err(ProtoBad));
    }

    #[test]
    fn drops_malformed_keys_silently() {
        // No '=' at all: dropped, not an error.
        let msg = parse("REQ LOGIN justatoken nick=bob").unwrap();
        assert_eq!(msg.pairs().len(), 1);
        assert_eq!(msg.get("nick"), "bob");

        // Empty key: dropped.
        let msg = parse("REQ LOGIN =novalue nick=bob").unwrap();
        assert_eq!(msg.pairs().len(), 1);

        // Over-long key (>=32 bytes): dropped.
        let long_key = "k".repeat(32);
        let line = format!("REQ LOGIN {long_key}=x nick=bob");
        let msg = parse(&line).unwrap();
        assert_eq!(msg.pairs().len(), 1);
    }

    #[test]
    fn truncates_overflowing_values_instead_of_rejecting() {
        let long_value = "v".repeat(200);
        let line = format!("REQ LOGIN nick={long_value}");
        let msg = parse(&line).unwrap();
        assert_eq!(msg.get("nick").len(), MAX_VALUE_LEN);
    }

    #[test]
    fn caps_pair_count() {
        let mut line = String::from("REQ LOGIN ");
        for i in 0..40 {
            line.push_str(&format!("k{i}=v{i} "));
        }
        let msg = parse(&line).unwrap();
        assert_eq!(msg.pairs().len(), MAX_PAIRS);
    }

    #[test]
    fn round_trip_get_after_parse() {
        // proto_get(proto_parse("REQ X "+k+"="+v), k) == v for ordinary ASCII.
        let k = "wish";
        let v = "H";
        let line = format!("REQ X {}", kv(k, v));
        let msg = parse(&line).unwrap();
        assert_eq!(msg.get(k), v);
    }
}
