use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, register_int_gauge_vec, HistogramVec,
    IntCounterVec, IntGaugeVec,
};

pub static REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "gh_fetcher_requests_total",
        "Page requests by resource and status class",
        &["resource", "status"]
    )
    .expect("requests total")
});

pub static RECORDS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "gh_fetcher_records_total",
        "Raw records returned by completed fetches",
        &["resource"]
    )
    .expect("records total")
});

pub static RETRIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "gh_fetcher_retries_total",
        "Page retries by resource and reason",
        &["resource", "reason"]
    )
    .expect("retries")
});

pub static FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "gh_fetcher_failures_total",
        "Fetches that ended without a complete record list",
        &["resource", "kind"]
    )
    .expect("failures")
});

pub static SLEEP_SECONDS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "gh_fetcher_sleep_seconds_total",
        "Seconds spent waiting before a request, by reason",
        &["reason"]
    )
    .expect("sleep seconds")
});

pub static RATE_REMAINING: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "gh_fetcher_rate_remaining",
        "Core rate limit remaining per token",
        &["token"]
    )
    .expect("rate remaining")
});

pub static LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "gh_fetcher_latency_seconds",
        "Page request latency per resource",
        &["resource"]
    )
    .expect("latency")
});

pub fn status_class(status: http::StatusCode) -> &'static str {
    match status.as_u16() {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        500..=599 => "5xx",
        _ => "other",
    }
}
