use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};

pub static HITS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "cache_hits_total",
        "Reads answered from the cache",
        &["resource"]
    )
    .expect("cache hits")
});

pub static MISSES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "cache_misses_total",
        "Reads that required a remote fetch",
        &["resource"]
    )
    .expect("cache misses")
});

pub static COMMITS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "cache_fetches_committed_total",
        "Fetch results persisted to the cache",
        &["resource"]
    )
    .expect("cache commits")
});

pub static APPENDS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "cache_appends_total",
        "Batches appended to existing keys",
        &["resource"]
    )
    .expect("cache appends")
});

pub static INVALIDATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "cache_invalidations_total",
        "Keys explicitly invalidated",
        &["resource"]
    )
    .expect("cache invalidations")
});
