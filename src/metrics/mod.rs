//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Request registration and completion
//! - Message traffic between chains
//! - Dead-lettered and dropped messages
//! - Retries and relay rounds

use crate::events::ProtocolEvent;
use crate::types::{ChainId, RequestKind};

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

lazy_static! {
    // Event metrics
    pub static ref EVENTS_RECORDED: CounterVec = register_counter_vec!(
        "synth_events_recorded_total",
        "Total protocol events recorded by type",
        &["chain_id", "event_type"]
    ).unwrap();

    // Request metrics
    pub static ref REQUESTS_REGISTERED: CounterVec = register_counter_vec!(
        "synth_requests_registered_total",
        "Total cross-chain requests registered",
        &["chain_id", "kind"]
    ).unwrap();

    pub static ref REQUESTS_FINISHED: CounterVec = register_counter_vec!(
        "synth_requests_finished_total",
        "Total cross-chain requests finished",
        &["chain_id", "kind"]
    ).unwrap();

    // Message metrics
    pub static ref MESSAGES_SENT: CounterVec = register_counter_vec!(
        "synth_messages_sent_total",
        "Total messages handed to the transport",
        &["src_chain_id", "dst_chain_id"]
    ).unwrap();

    pub static ref MESSAGES_DELIVERED: CounterVec = register_counter_vec!(
        "synth_messages_delivered_total",
        "Total inbound messages handled successfully",
        &["chain_id"]
    ).unwrap();

    pub static ref MESSAGES_FAILED: CounterVec = register_counter_vec!(
        "synth_messages_failed_total",
        "Total inbound messages whose handler failed",
        &["chain_id", "reason", "disposition"]
    ).unwrap();

    pub static ref MESSAGES_RETRIED: CounterVec = register_counter_vec!(
        "synth_messages_retried_total",
        "Total cached messages replayed successfully",
        &["chain_id"]
    ).unwrap();

    // Relay metrics
    pub static ref RELAY_BATCH_SIZE: HistogramVec = register_histogram_vec!(
        "synth_relay_batch_size",
        "Envelopes delivered per relay round",
        &["dst_chain_id"],
        vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0]
    ).unwrap();
}

/// Render all registered metrics in the text exposition format
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

// Helper functions to record metrics

pub fn record_event(event: &ProtocolEvent) {
    EVENTS_RECORDED
        .with_label_values(&[&event.chain_id().to_string(), event.name()])
        .inc();

    match event {
        ProtocolEvent::RequestRegistered { chain_id, kind, .. } => {
            record_request_registered(*chain_id, *kind)
        }
        ProtocolEvent::RequestFinished { chain_id, kind, .. } => {
            record_request_finished(*chain_id, *kind)
        }
        ProtocolEvent::MessageSent {
            chain_id,
            dst_chain_id,
            ..
        } => record_message_sent(*chain_id, *dst_chain_id),
        ProtocolEvent::MessageDelivered { chain_id, .. } => record_message_delivered(*chain_id),
        ProtocolEvent::MessageRetried { chain_id, .. } => record_message_retried(*chain_id),
        _ => {}
    }
}

pub fn record_request_registered(chain_id: ChainId, kind: RequestKind) {
    REQUESTS_REGISTERED
        .with_label_values(&[&chain_id.to_string(), &kind.to_string()])
        .inc();
}

pub fn record_request_finished(chain_id: ChainId, kind: RequestKind) {
    REQUESTS_FINISHED
        .with_label_values(&[&chain_id.to_string(), &kind.to_string()])
        .inc();
}

pub fn record_message_sent(src_chain_id: ChainId, dst_chain_id: ChainId) {
    MESSAGES_SENT
        .with_label_values(&[&src_chain_id.to_string(), &dst_chain_id.to_string()])
        .inc();
}

pub fn record_message_delivered(chain_id: ChainId) {
    MESSAGES_DELIVERED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_message_failed(chain_id: ChainId, reason: &str, retained: bool) {
    let disposition = if retained { "retained" } else { "dropped" };
    MESSAGES_FAILED
        .with_label_values(&[&chain_id.to_string(), reason, disposition])
        .inc();
}

pub fn record_message_retried(chain_id: ChainId) {
    MESSAGES_RETRIED
        .with_label_values(&[&chain_id.to_string()])
        .inc();
}

pub fn record_relay_batch(dst_chain_id: ChainId, size: usize) {
    RELAY_BATCH_SIZE
        .with_label_values(&[&dst_chain_id.to_string()])
        .observe(size as f64);
}
