use std::fmt::Write;
use anyhow::{anyhow, bail};
use tracing::{debug, warn};

use crate::message::message::{Message, MessageType};

const HEADER_FROM: &str = "From";
const HEADER_TARGET_QUEUE: &str = "Target-Queue";
const HEADER_RETRANSMIT_COUNT: &str = "Retransmit-Count";
const HEADER_PAYLOAD_BYTES: &str = "Payload-Bytes";
const HEADER_FAILOVER: &str = "Failover";
const HEADER_TARGET_ROUTE: &str = "Target-Route";
const HEADER_GROUP_ID: &str = "Group-Id";
const HEADER_TAG: &str = "Tag";

const NOT_AVAILABLE: &str = "N/A";

/// Parses a raw datagram. This never fails: anything that can not be parsed results in a message
///  of type [MessageType::Invalid].
pub fn parse(raw: &[u8]) -> Message {
    match try_parse(raw) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("received unparseable message: {}", e);
            Message::invalid()
        }
    }
}

fn try_parse(raw: &[u8]) -> anyhow::Result<Message> {
    if raw.is_empty() {
        bail!("empty message");
    }
    let text = std::str::from_utf8(raw)?;

    let (head, payload) = match text.find("\n\n") {
        Some(idx) => (&text[..idx], &text[idx + 2..]),
        None => (text, ""),
    };

    let mut lines = head.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line));

    let first_line = lines.next().unwrap_or("");
    let mut msg = if let Some(id) = first_line.strip_prefix("ACK ") {
        Message::with_type(MessageType::Ack, Some(checked_id(id)?))
    }
    else if let Some(id) = first_line.strip_prefix("NACK ") {
        Message::with_type(MessageType::Nack, Some(checked_id(id)?))
    }
    else if first_line.starts_with("HEARTBEAT") {
        let mut msg = Message::with_type(MessageType::Heartbeat, None);
        match lines.next().and_then(split_header) {
            Some((HEADER_FROM, value)) => msg.from = Some(value.to_string()),
            _ => bail!("heartbeat without a 'From' header"),
        }
        msg
    }
    else {
        Message::with_type(MessageType::Normal, Some(checked_id(first_line)?))
    };

    let mut declared_payload_bytes = None;
    for line in lines {
        if line.is_empty() {
            continue;
        }

        let Some((key, value)) = split_header(line) else {
            debug!("skipping unrecognized header line {:?}", line);
            continue;
        };

        match key {
            HEADER_FROM => msg.from = Some(value.to_string()),
            HEADER_TARGET_QUEUE => msg.target_queue = Some(value.to_string()),
            HEADER_RETRANSMIT_COUNT => {
                msg.retransmit_count = value.trim().parse()
                    .map_err(|e| anyhow!("invalid retransmit count {:?}: {}", value, e))?;
            }
            HEADER_PAYLOAD_BYTES => {
                let declared: usize = value.trim().parse()
                    .map_err(|e| anyhow!("invalid payload bytes {:?}: {}", value, e))?;
                declared_payload_bytes = Some(declared);
            }
            HEADER_FAILOVER => msg.failover = value.trim().eq_ignore_ascii_case("true"),
            HEADER_TARGET_ROUTE => {
                if value != NOT_AVAILABLE {
                    msg.target_route = Some(value.to_string());
                }
            }
            HEADER_GROUP_ID => msg.group_id = Some(value.to_string()),
            HEADER_TAG => msg.tag = Some(value.to_string()),
            _ => debug!("skipping unrecognized header {:?}", line),
        }
    }

    match declared_payload_bytes {
        Some(declared) => {
            if declared != payload.len() {
                debug!("payload has {} bytes, but the header declares {} - using the actual payload", payload.len(), declared);
            }
            msg.payload = Some(payload.to_string());
        }
        None if !payload.is_empty() => msg.payload = Some(payload.to_string()),
        None => {}
    }

    Ok(msg)
}

fn checked_id(id: &str) -> anyhow::Result<String> {
    if id.is_empty() {
        bail!("missing message id");
    }
    if id.contains(' ') {
        bail!("message id {:?} contains a space", id);
    }
    Ok(id.to_string())
}

fn split_header(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    Some((key, value.strip_prefix(' ').unwrap_or(value)))
}

/// Serializes a message to its wire form. Invalid messages and messages without a `from` node can
///  not be serialized.
pub fn serialize(msg: &Message) -> anyhow::Result<String> {
    match try_serialize(msg) {
        Ok(s) => Ok(s),
        Err(e) => {
            warn!("message can not be serialized: {}", e);
            Err(e)
        }
    }
}

fn try_serialize(msg: &Message) -> anyhow::Result<String> {
    if msg.message_type == MessageType::Invalid {
        bail!("attempting to serialize an invalid message");
    }
    let Some(from) = &msg.from else {
        bail!("message {:?} has no 'From'", msg.id);
    };

    let mut buf = String::new();
    match msg.message_type {
        MessageType::Normal => writeln!(buf, "{}", required_id(msg)?)?,
        MessageType::Ack => writeln!(buf, "ACK {}", required_id(msg)?)?,
        MessageType::Nack => writeln!(buf, "NACK {}", required_id(msg)?)?,
        MessageType::Heartbeat => writeln!(buf, "HEARTBEAT")?,
        MessageType::Invalid => unreachable!("checked above"),
    }

    write_header(&mut buf, HEADER_FROM, from)?;
    if let Some(target_queue) = &msg.target_queue {
        write_header(&mut buf, HEADER_TARGET_QUEUE, target_queue)?;
    }
    if msg.retransmit_count > 0 {
        write_header(&mut buf, HEADER_RETRANSMIT_COUNT, &msg.retransmit_count.to_string())?;
    }
    if msg.failover {
        write_header(&mut buf, HEADER_FAILOVER, "true")?;
    }
    write_header(&mut buf, HEADER_TARGET_ROUTE, msg.target_route.as_deref().unwrap_or(NOT_AVAILABLE))?;
    if let Some(group_id) = msg.group_id.as_ref().filter(|g| !g.is_empty()) {
        write_header(&mut buf, HEADER_GROUP_ID, group_id)?;
    }
    if let Some(tag) = msg.tag.as_ref().filter(|t| !t.trim().is_empty()) {
        write_header(&mut buf, HEADER_TAG, tag)?;
    }
    if msg.payload.is_some() {
        write_header(&mut buf, HEADER_PAYLOAD_BYTES, &msg.payload_bytes().to_string())?;
    }

    buf.push('\n');
    if let Some(payload) = &msg.payload {
        buf.push_str(payload);
    }
    Ok(buf)
}

fn required_id(msg: &Message) -> anyhow::Result<&str> {
    match msg.id.as_deref() {
        None => bail!("{:?} message without an id", msg.message_type),
        Some(id) if id.is_empty() || id.contains(|c: char| c == ' ' || c == '\n' || c == '\r') => {
            bail!("invalid message id {:?}", id)
        }
        Some(id) => Ok(id),
    }
}

fn write_header(buf: &mut String, key: &str, value: &str) -> anyhow::Result<()> {
    if value.contains(['\n', '\r']) {
        bail!("header {} contains a line break: {:?}", key, value);
    }
    writeln!(buf, "{}: {}", key, value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use crate::config::node::Node;
    use super::*;

    fn node(name: &str) -> Node {
        Node::new(name, "localhost", 7000)
    }

    fn full_normal() -> Message {
        let mut msg = Message::normal("a1b2c3", &node("a"))
            .with_payload("first line\n\nafter a blank line\näöü")
            .with_target_queue(Some("orders".to_string()))
            .with_target_route(Some("to-b".to_string()))
            .with_group_id(Some("group-7".to_string()))
            .with_tag(Some("urgent".to_string()));
        msg.retransmit_count = 2;
        msg.failover = true;
        msg
    }

    #[rstest]
    #[case::minimal_normal(Message::normal("xyz", &node("a")))]
    #[case::full_normal(full_normal())]
    #[case::empty_payload(Message::normal("xyz", &node("a")).with_payload(""))]
    #[case::ack(Message::ack_for(&full_normal(), &node("b")))]
    #[case::nack(Message::nack_for(&full_normal(), &node("b")))]
    #[case::heartbeat(Message::heartbeat(&node("c")))]
    fn test_round_trip(#[case] msg: Message) {
        let serialized = serialize(&msg).unwrap();
        let parsed = parse(serialized.as_bytes());
        assert_eq!(parsed, msg);
    }

    #[test]
    fn test_serialize_full() {
        let serialized = serialize(&full_normal()).unwrap();
        assert_eq!(serialized, "a1b2c3\n\
            From: a\n\
            Target-Queue: orders\n\
            Retransmit-Count: 2\n\
            Failover: true\n\
            Target-Route: to-b\n\
            Group-Id: group-7\n\
            Tag: urgent\n\
            Payload-Bytes: 37\n\
            \n\
            first line\n\nafter a blank line\näöü");
    }

    #[rstest]
    #[case::normal(Message::normal("xyz", &node("a")), "xyz\nFrom: a\nTarget-Route: N/A\n\n")]
    #[case::ack(Message::ack_for(&Message::normal("xyz", &node("a")), &node("b")), "ACK xyz\nFrom: b\nTarget-Route: N/A\n\n")]
    #[case::heartbeat(Message::heartbeat(&node("c")), "HEARTBEAT\nFrom: c\nTarget-Route: N/A\n\n")]
    #[case::blank_tag(Message::normal("xyz", &node("a")).with_tag(Some("  ".to_string())).with_group_id(Some("".to_string())), "xyz\nFrom: a\nTarget-Route: N/A\n\n")]
    fn test_serialize_minimal(#[case] msg: Message, #[case] expected: &str) {
        assert_eq!(serialize(&msg).unwrap(), expected);
    }

    #[rstest]
    #[case::invalid(Message::invalid())]
    #[case::no_from(Message::with_type(MessageType::Normal, Some("abc".to_string())))]
    #[case::no_id(Message::with_type(MessageType::Ack, None))]
    #[case::id_with_space(Message::normal("a b", &node("a")))]
    #[case::line_break_in_header(Message::normal("abc", &node("a")).with_tag(Some("x\ny".to_string())))]
    fn test_serialize_rejects(#[case] msg: Message) {
        assert!(serialize(&msg).is_err());
    }

    #[rstest]
    #[case::empty(b"")]
    #[case::empty_id(b"\nFrom: a\n\n")]
    #[case::empty_ack_id(b"ACK \nFrom: a\n\n")]
    #[case::heartbeat_without_from(b"HEARTBEAT\nTarget-Route: N/A\n\n")]
    #[case::heartbeat_only(b"HEARTBEAT")]
    #[case::bad_retransmit_count(b"abc\nFrom: a\nRetransmit-Count: x\n\n")]
    #[case::bad_payload_bytes(b"abc\nFrom: a\nPayload-Bytes: -1\n\nxyz")]
    #[case::not_utf8(b"abc\nFrom: \xff\xfe\n\n")]
    fn test_parse_invalid(#[case] raw: &[u8]) {
        assert_eq!(parse(raw).message_type, MessageType::Invalid);
    }

    #[test]
    fn test_serialize_payload_bytes_counts_utf8_bytes() {
        let msg = Message::normal("abc", &node("a"))
            .with_payload("äöü");
        let serialized = serialize(&msg).unwrap();

        assert!(serialized.contains("\nPayload-Bytes: 6\n"));
        assert_eq!(parse(serialized.as_bytes()).payload.as_deref(), Some("äöü"));
    }

    #[test]
    fn test_parse_skips_unknown_headers() {
        let msg = parse(b"abc\nFrom: a\nX-Whatever: 1\nno colon here\nTarget-Queue: q\n\npayload");
        assert_eq!(msg.message_type, MessageType::Normal);
        assert_eq!(msg.id.as_deref(), Some("abc"));
        assert_eq!(msg.from.as_deref(), Some("a"));
        assert_eq!(msg.target_queue.as_deref(), Some("q"));
        assert_eq!(msg.payload.as_deref(), Some("payload"));
    }

    #[test]
    fn test_parse_nack() {
        let msg = parse(b"NACK abc\nFrom: b\nTarget-Route: r1\nGroup-Id: g\n\n");
        assert_eq!(msg.message_type, MessageType::Nack);
        assert_eq!(msg.id.as_deref(), Some("abc"));
        assert_eq!(msg.target_route.as_deref(), Some("r1"));
        assert_eq!(msg.group_id.as_deref(), Some("g"));
        assert_eq!(msg.payload, None);
    }

    #[test]
    fn test_parse_payload_is_verbatim() {
        let msg = parse(b"abc\nFrom: a\nPayload-Bytes: 23\n\nACK x\nFrom: b\n\nTag: y\n\n");
        assert_eq!(msg.payload.as_deref(), Some("ACK x\nFrom: b\n\nTag: y\n\n"));
        assert_eq!(msg.tag, None);
    }

    #[test]
    fn test_parse_crlf_headers() {
        let msg = parse(b"abc\r\nFrom: a\r\nFailover: TRUE\r\n\n");
        assert_eq!(msg.from.as_deref(), Some("a"));
        assert!(msg.failover);
    }
}
