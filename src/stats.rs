use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::message::message::MessageType;

#[derive(Default)]
struct PerType {
    normal: AtomicU64,
    ack: AtomicU64,
    nack: AtomicU64,
    heartbeat: AtomicU64,
}
impl PerType {
    fn counter(&self, message_type: MessageType) -> Option<&AtomicU64> {
        match message_type {
            MessageType::Normal => Some(&self.normal),
            MessageType::Ack => Some(&self.ack),
            MessageType::Nack => Some(&self.nack),
            MessageType::Heartbeat => Some(&self.heartbeat),
            MessageType::Invalid => None,
        }
    }

    fn snapshot(&self) -> PerTypeSnapshot {
        PerTypeSnapshot {
            normal: self.normal.load(Ordering::Relaxed),
            ack: self.ack.load(Ordering::Relaxed),
            nack: self.nack.load(Ordering::Relaxed),
            heartbeat: self.heartbeat.load(Ordering::Relaxed),
        }
    }
}

/// Counters for LwComm traffic. All updates are lock-free and relaxed: the numbers are for
///  monitoring, and a snapshot is not guaranteed to be consistent across counters.
#[derive(Default)]
pub struct LwCommStats {
    sent: PerType,
    sent_failover: AtomicU64,
    sent_retransmit: AtomicU64,
    received: PerType,
    received_invalid: AtomicU64,

    acknowledged: AtomicU64,
    timed_out: AtomicU64,
    rejected: AtomicU64,
    cancelled: AtomicU64,
    transport_errors: AtomicU64,

    registered_senders: AtomicU64,

    rtt_count: AtomicU64,
    rtt_sum_micros: AtomicU64,
    rtt_max_micros: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct PerTypeSnapshot {
    pub normal: u64,
    pub ack: u64,
    pub nack: u64,
    pub heartbeat: u64,
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub struct StatsSnapshot {
    pub sent: PerTypeSnapshot,
    pub sent_failover: u64,
    pub sent_retransmit: u64,
    pub received: PerTypeSnapshot,
    pub received_invalid: u64,
    pub acknowledged: u64,
    pub timed_out: u64,
    pub rejected: u64,
    pub cancelled: u64,
    pub transport_errors: u64,
    pub registered_senders: u64,
    pub rtt_count: u64,
    pub rtt_sum_micros: u64,
    pub rtt_max_micros: u64,
}

impl StatsSnapshot {
    pub fn rtt_avg(&self) -> Option<Duration> {
        if self.rtt_count == 0 {
            return None;
        }
        Some(Duration::from_micros(self.rtt_sum_micros / self.rtt_count))
    }
}

impl LwCommStats {
    pub fn on_sent(&self, message_type: MessageType, failover: bool, retransmit_index: u32) {
        if let Some(counter) = self.sent.counter(message_type) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
        if failover {
            self.sent_failover.fetch_add(1, Ordering::Relaxed);
        }
        if retransmit_index > 0 {
            self.sent_retransmit.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn on_received(&self, message_type: MessageType) {
        match self.received.counter(message_type) {
            Some(counter) => counter.fetch_add(1, Ordering::Relaxed),
            None => self.received_invalid.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn on_acknowledged(&self, rtt: Duration) {
        self.acknowledged.fetch_add(1, Ordering::Relaxed);

        let micros = u64::try_from(rtt.as_micros()).unwrap_or(u64::MAX);
        self.rtt_count.fetch_add(1, Ordering::Relaxed);
        self.rtt_sum_micros.fetch_add(micros, Ordering::Relaxed);
        self.rtt_max_micros.fetch_max(micros, Ordering::Relaxed);
    }

    pub fn on_timed_out(&self) {
        self.timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_registered_senders(&self, n: usize) {
        self.registered_senders.store(n as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sent: self.sent.snapshot(),
            sent_failover: self.sent_failover.load(Ordering::Relaxed),
            sent_retransmit: self.sent_retransmit.load(Ordering::Relaxed),
            received: self.received.snapshot(),
            received_invalid: self.received_invalid.load(Ordering::Relaxed),
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            registered_senders: self.registered_senders.load(Ordering::Relaxed),
            rtt_count: self.rtt_count.load(Ordering::Relaxed),
            rtt_sum_micros: self.rtt_sum_micros.load(Ordering::Relaxed),
            rtt_max_micros: self.rtt_max_micros.load(Ordering::Relaxed),
        }
    }
}
