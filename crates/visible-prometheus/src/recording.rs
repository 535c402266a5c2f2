// SPDX-FileCopyrightText: 2026 Visible Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade; without an installed recorder every call is
//! a no-op.

use metrics::{describe_counter, describe_gauge};

/// Register all metric descriptions. Called once after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "visible_sessions_total",
        "Work session transitions, by state entered"
    );
    describe_gauge!(
        "visible_active_sessions",
        "Sessions currently waiting or active"
    );
    describe_counter!("visible_chat_messages_total", "Chat messages accepted");
    describe_counter!(
        "visible_distance_broadcasts_total",
        "Distance updates broadcast to session parties"
    );
    describe_counter!(
        "visible_push_deliveries_total",
        "Push notification attempts, by outcome"
    );
    describe_counter!(
        "visible_expired_messages_total",
        "Chat messages removed by the expiry sweep"
    );
}

/// Record a session entering `state`.
pub fn record_session_transition(state: &str) {
    metrics::counter!("visible_sessions_total", "state" => state.to_string()).increment(1);
}

/// Set the number of non-terminal sessions.
pub fn set_active_sessions(count: f64) {
    metrics::gauge!("visible_active_sessions").set(count);
}

pub fn record_chat_message() {
    metrics::counter!("visible_chat_messages_total").increment(1);
}

pub fn record_distance_broadcast() {
    metrics::counter!("visible_distance_broadcasts_total").increment(1);
}

/// Record one push attempt.
pub fn record_push_delivery(sent: bool) {
    let outcome = if sent { "sent" } else { "failed" };
    metrics::counter!("visible_push_deliveries_total", "outcome" => outcome).increment(1);
}

pub fn record_expired_messages(count: u64) {
    metrics::counter!("visible_expired_messages_total").increment(count);
}
