use std::sync::Arc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use tracing::{trace, warn};

use crate::sender::message_sender::MessageSender;
use crate::stats::LwCommStats;

/// All senders that wait for an ACK or NACK, by message id. Incoming ACK / NACK messages are
///  routed to their sender through this registry.
pub struct SenderRegistry {
    senders: DashMap<String, Arc<MessageSender>, FxBuildHasher>,
    stats: Arc<LwCommStats>,
}

impl SenderRegistry {
    pub fn new(stats: Arc<LwCommStats>) -> SenderRegistry {
        SenderRegistry {
            senders: DashMap::with_hasher(FxBuildHasher),
            stats,
        }
    }

    pub fn register(&self, sender: Arc<MessageSender>) {
        let Some(id) = sender.message_id() else {
            warn!("attempting to register a sender for a message without id - ignoring");
            return;
        };
        trace!("registering sender for message {}", id);

        match self.senders.entry(id.to_string()) {
            Entry::Occupied(_) => {
                warn!("message id {} is registered already - keeping the first sender, the new one will not receive ACK / NACK", id);
            }
            Entry::Vacant(entry) => {
                entry.insert(sender.clone());
            }
        }
        self.stats.set_registered_senders(self.senders.len());
    }

    /// Removes `sender` if it is registered. A different sender registered under the same id is
    ///  left alone.
    pub fn unregister(&self, sender: &MessageSender) {
        let Some(id) = sender.message_id() else {
            return;
        };

        let removed = self.senders.remove_if(id, |_, registered| std::ptr::eq(Arc::as_ptr(registered), sender));
        if removed.is_some() {
            trace!("unregistered sender for message {}", id);
            self.stats.set_registered_senders(self.senders.len());
        }
    }

    /// `None` for unknown ids, which is expected for late or duplicate ACK / NACK messages
    pub fn lookup(&self, id: &str) -> Option<Arc<MessageSender>> {
        self.senders.get(id)
            .map(|s| s.value().clone())
    }

    pub fn senders(&self) -> Vec<Arc<MessageSender>> {
        self.senders.iter()
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::node::Node;
    use crate::message::message::Message;
    use crate::sender::message_sender::MessageSender;
    use crate::sender::send_chain::SendChain;
    use crate::sender::SenderContext;
    use crate::test_util::transport::TrackingMockTransport;
    use super::*;

    fn sender(context: &Arc<SenderContext>, id: &str) -> Arc<MessageSender> {
        let msg = Message::normal(id, &Node::new("a", "localhost", 1));
        MessageSender::new(msg, SendChain::default(), context.clone()).0
    }

    #[test]
    fn test_register_lookup_unregister() {
        let stats = Arc::new(LwCommStats::default());
        let context = Arc::new(SenderContext::new(Arc::new(TrackingMockTransport::new()), stats.clone()));
        let registry = &context.registry;

        let s1 = sender(&context, "id1");
        let s2 = sender(&context, "id2");
        registry.register(s1.clone());
        registry.register(s2.clone());
        assert_eq!(registry.len(), 2);
        assert_eq!(stats.snapshot().registered_senders, 2);

        assert!(Arc::ptr_eq(&registry.lookup("id1").unwrap(), &s1));
        assert!(registry.lookup("unknown").is_none());

        registry.unregister(&s1);
        assert!(registry.lookup("id1").is_none());
        assert_eq!(stats.snapshot().registered_senders, 1);

        // idempotent
        registry.unregister(&s1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unregister_leaves_other_sender_with_same_id() {
        let context = Arc::new(SenderContext::new(Arc::new(TrackingMockTransport::new()), Arc::new(LwCommStats::default())));
        let registry = &context.registry;

        let registered = sender(&context, "same");
        let other = sender(&context, "same");
        registry.register(registered.clone());

        registry.unregister(&other);
        assert!(Arc::ptr_eq(&registry.lookup("same").unwrap(), &registered));
    }

    #[test]
    fn test_duplicate_id_keeps_first_sender() {
        let stats = Arc::new(LwCommStats::default());
        let context = Arc::new(SenderContext::new(Arc::new(TrackingMockTransport::new()), stats.clone()));
        let registry = &context.registry;

        let first = sender(&context, "same");
        let second = sender(&context, "same");
        registry.register(first.clone());
        registry.register(second.clone());

        assert_eq!(registry.len(), 1);
        assert_eq!(stats.snapshot().registered_senders, 1);
        assert!(Arc::ptr_eq(&registry.lookup("same").unwrap(), &first));

        registry.unregister(&second);
        assert!(Arc::ptr_eq(&registry.lookup("same").unwrap(), &first));
    }
}
