use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{opts, register_int_counter, Encoder, IntCounter, TextEncoder};

pub static PUSHES_SENT_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "apns_push_sent_total",
        "Total number of push packets written to the gateway"
    ))
    .unwrap()
});

pub static PUSH_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "apns_push_errors_total",
        "Total number of APNS error responses received"
    ))
    .unwrap()
});

pub static DISCONNECTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "apns_push_disconnects_total",
        "Total number of gateway disconnects after an error response"
    ))
    .unwrap()
});

pub static FEEDBACK_RECORDS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "apns_feedback_records_total",
        "Total number of unreachable-token records read from the feedback service"
    ))
    .unwrap()
});

pub fn gather_metrics() -> Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;

    Ok(String::from_utf8(buffer)?)
}
