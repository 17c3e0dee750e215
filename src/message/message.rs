use crate::config::node::Node;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum MessageType {
    Normal,
    Ack,
    Nack,
    Heartbeat,
    /// result of parsing garbage - such a message carries no usable fields and can not be
    ///  serialized
    Invalid,
}

/// A single LwComm message. Which fields are meaningful depends on the [MessageType]:
///
/// * `Normal` has an id, a `from` node, optionally a payload and routing / correlation data
/// * `Ack` / `Nack` carry the id of the message they respond to, and echo its target route and
///    group id
/// * `Heartbeat` has no id
///
/// Messages are created through the factory functions ([Message::normal], [Message::ack_for],
///  [Message::nack_for], [Message::heartbeat]) or by parsing.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Message {
    pub id: Option<String>,
    pub message_type: MessageType,
    pub from: Option<String>,
    pub target_queue: Option<String>,
    /// number of retransmissions preceding this wire instance for its current destination
    pub retransmit_count: u32,
    pub payload: Option<String>,
    /// set once the send chain moved past the first destination
    pub failover: bool,
    pub target_route: Option<String>,
    pub group_id: Option<String>,
    pub tag: Option<String>,
}

impl Message {
    fn empty(message_type: MessageType, id: Option<String>, from: Option<String>) -> Message {
        Message {
            id,
            message_type,
            from,
            target_queue: None,
            retransmit_count: 0,
            payload: None,
            failover: false,
            target_route: None,
            group_id: None,
            tag: None,
        }
    }

    pub fn normal(id: impl Into<String>, from: &Node) -> Message {
        Self::empty(MessageType::Normal, Some(id.into()), Some(from.name.clone()))
    }

    pub fn ack_for(original: &Message, from: &Node) -> Message {
        Self::response_for(MessageType::Ack, original, from)
    }

    pub fn nack_for(original: &Message, from: &Node) -> Message {
        Self::response_for(MessageType::Nack, original, from)
    }

    fn response_for(message_type: MessageType, original: &Message, from: &Node) -> Message {
        let mut result = Self::empty(message_type, original.id.clone(), Some(from.name.clone()));
        result.target_route = original.target_route.clone();
        result.group_id = original.group_id.clone();
        result
    }

    pub fn heartbeat(from: &Node) -> Message {
        Self::empty(MessageType::Heartbeat, None, Some(from.name.clone()))
    }

    pub fn invalid() -> Message {
        Self::empty(MessageType::Invalid, None, None)
    }

    pub(crate) fn with_type(message_type: MessageType, id: Option<String>) -> Message {
        Self::empty(message_type, id, None)
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Message {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_target_queue(mut self, target_queue: Option<String>) -> Message {
        self.target_queue = target_queue;
        self
    }

    pub fn with_target_route(mut self, target_route: Option<String>) -> Message {
        self.target_route = target_route;
        self
    }

    pub fn with_group_id(mut self, group_id: Option<String>) -> Message {
        self.group_id = group_id;
        self
    }

    pub fn with_tag(mut self, tag: Option<String>) -> Message {
        self.tag = tag;
        self
    }

    /// UTF-8 length of the payload, which is what goes into the `Payload-Bytes` header
    pub fn payload_bytes(&self) -> usize {
        self.payload.as_ref()
            .map(|p| p.len())
            .unwrap_or(0)
    }

    pub fn is_valid(&self) -> bool {
        self.message_type != MessageType::Invalid
    }
}
