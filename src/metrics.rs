use lazy_static::lazy_static;
use prometheus::{
    Counter, Encoder, Gauge, Histogram, TextEncoder, histogram_opts, register_counter,
    register_gauge, register_histogram,
};

// Registration only fails on a duplicate name, which would be a bug here.
lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("drawthings_requests_total", "Total number of generate requests").unwrap();
    pub static ref CACHE_HITS: Counter =
        register_counter!("drawthings_cache_hits_total", "Total cache hits").unwrap();
    pub static ref CACHE_MISSES: Counter =
        register_counter!("drawthings_cache_misses_total", "Total cache misses").unwrap();
    pub static ref CACHE_EVICTIONS: Counter =
        register_counter!("drawthings_cache_evictions_total", "Entries evicted to make room").unwrap();
    pub static ref GENERATION_LATENCY: Histogram = register_histogram!(histogram_opts!(
        "drawthings_generation_latency_seconds",
        "Backend generation latency in seconds",
        vec![0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 90.0, 120.0]
    ))
    .unwrap();
    pub static ref CACHE_SIZE: Gauge =
        register_gauge!("drawthings_cache_size", "Current number of items in cache").unwrap();
}

// Text exposition of everything in the default registry
pub fn render() -> Result<String, String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| e.to_string())?;
    String::from_utf8(buffer).map_err(|e| e.to_string())
}
