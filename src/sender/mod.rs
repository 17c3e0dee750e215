use std::sync::Arc;

use crate::message::message::Message;
use crate::sender::message_sender::MessageSender;
use crate::sender::registry::SenderRegistry;
use crate::sender::send_chain::SendChain;
use crate::sender::send_result::SendHandle;
use crate::stats::LwCommStats;
use crate::transport::Transport;

pub mod send_chain;
pub mod message_sender;
pub mod registry;
pub mod send_result;

/// The collaborators every [MessageSender] needs. There is one context per LwComm instance,
///  shared by all its senders.
pub struct SenderContext {
    pub transport: Arc<dyn Transport>,
    pub registry: SenderRegistry,
    pub stats: Arc<LwCommStats>,
}

impl SenderContext {
    pub fn new(transport: Arc<dyn Transport>, stats: Arc<LwCommStats>) -> SenderContext {
        SenderContext {
            transport,
            registry: SenderRegistry::new(stats.clone()),
            stats,
        }
    }
}

/// Creates a sender for a message and its chain, registers it if it waits for an ACK / NACK, and
///  starts it.
pub async fn launch(context: &Arc<SenderContext>, message: Message, chain: SendChain) -> SendHandle {
    let (sender, result) = MessageSender::new(message, chain, context.clone());
    if sender.awaits_response() {
        context.registry.register(sender.clone());
    }
    sender.start().await;
    SendHandle::new(sender, result)
}
