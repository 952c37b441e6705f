use std::cmp::Ordering;
use std::hint::black_box;
use std::time::Instant;

use sieve_core::types::{FilteringContext, MatchResult, RequestType};
use sieve_core::Engine;

pub struct BenchOptions {
    pub requests: usize,
    pub iterations: usize,
    pub seed: u32,
}

struct BenchRequest {
    url: String,
    document_url: String,
    request_type: RequestType,
}

struct BenchResult {
    op_count: usize,
    total_ms: f64,
    avg_us: f64,
    p50_us: f64,
    p95_us: f64,
    p99_us: f64,
    ops_per_sec: u64,
    blocked_pct: f64,
    allowed_pct: f64,
}

pub fn run(engine: &Engine, opts: &BenchOptions) -> Result<(), String> {
    if opts.requests == 0 {
        return Err("Request count must be positive".to_string());
    }
    let requests = generate_test_requests(opts.requests, opts.seed);

    // Warm caches and the branch predictor
    for req in requests.iter().take(1000) {
        black_box(match_one(engine, req));
    }

    let result = run_benchmark(engine, &requests, opts.iterations.max(1));
    println!("{}", format_result(&result));
    Ok(())
}

fn match_one(engine: &Engine, req: &BenchRequest) -> MatchResult {
    let ctx = FilteringContext::new(&req.url, &req.document_url, req.request_type);
    engine.match_request(&ctx).result
}

fn run_benchmark(engine: &Engine, requests: &[BenchRequest], iterations: usize) -> BenchResult {
    let mut latencies = Vec::with_capacity(requests.len() * iterations);
    let mut blocked = 0usize;
    let mut allowed = 0usize;

    let start = Instant::now();
    for _ in 0..iterations {
        for req in requests {
            let t = Instant::now();
            let result = black_box(match_one(engine, req));
            latencies.push(t.elapsed().as_secs_f64() * 1_000_000.0);
            match result {
                MatchResult::Blocked => blocked += 1,
                MatchResult::Allowed => allowed += 1,
                MatchResult::NoMatch => {}
            }
        }
    }
    let total_ms = start.elapsed().as_secs_f64() * 1000.0;

    latencies.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let op_count = latencies.len();
    let pct = |n: usize| if op_count > 0 { n as f64 * 100.0 / op_count as f64 } else { 0.0 };

    BenchResult {
        op_count,
        total_ms,
        avg_us: if op_count == 0 { 0.0 } else { latencies.iter().sum::<f64>() / op_count as f64 },
        p50_us: percentile(&latencies, 0.50),
        p95_us: percentile(&latencies, 0.95),
        p99_us: percentile(&latencies, 0.99),
        ops_per_sec: if total_ms > 0.0 { (op_count as f64 / (total_ms / 1000.0)) as u64 } else { 0 },
        blocked_pct: pct(blocked),
        allowed_pct: pct(allowed),
    }
}

fn format_result(result: &BenchResult) -> String {
    format!(
        "match_request:\n  Ops: {}\n  Total: {:.2} ms\n  Avg: {:.2} us\n  P50: {:.2} us\n  P95: {:.2} us\n  P99: {:.2} us\n  Throughput: {} ops/sec\n  Blocked: {:.1}%\n  Allowed: {:.1}%",
        result.op_count,
        result.total_ms,
        result.avg_us,
        result.p50_us,
        result.p95_us,
        result.p99_us,
        result.ops_per_sec,
        result.blocked_pct,
        result.allowed_pct,
    )
}

/// Nearest-rank percentile of sorted values.
fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let idx = ((values.len() as f64) * p).ceil() as usize;
    let idx = idx.saturating_sub(1).min(values.len() - 1);
    values[idx]
}

fn create_rng(seed: u32) -> impl FnMut() -> f64 {
    let mut state = seed;
    move || {
        state = state.wrapping_mul(1664525).wrapping_add(1013904223);
        (state as f64) / (u32::MAX as f64)
    }
}

fn pick<T: Clone>(items: &[T], rand: &mut impl FnMut() -> f64) -> T {
    let idx = (rand() * items.len() as f64).floor() as usize;
    items[idx.min(items.len() - 1)].clone()
}

fn rand_alnum(rand: &mut impl FnMut() -> f64, len: usize) -> String {
    const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut out = String::with_capacity(len);
    for _ in 0..len {
        let idx = (rand() * CHARS.len() as f64).floor() as usize;
        out.push(CHARS[idx.min(CHARS.len() - 1)] as char);
    }
    out
}

fn generate_test_requests(count: usize, seed: u32) -> Vec<BenchRequest> {
    const AD_DOMAINS: &[&str] = &[
        "ads.example.com",
        "tracking.example.com",
        "analytics.test.com",
        "doubleclick.net",
        "googlesyndication.com",
        "google-analytics.com",
        "pagead2.googlesyndication.com",
        "cdn.ads.com",
        "metrics.example.com",
    ];
    const CLEAN_DOMAINS: &[&str] = &[
        "example.com",
        "github.com",
        "stackoverflow.com",
        "reddit.com",
        "wikipedia.org",
        "mozilla.org",
        "bbc.co.uk",
    ];
    const PATHS: &[&str] = &[
        "/",
        "/index.html",
        "/assets/main.js",
        "/api/v1/data",
        "/images/logo.png",
        "/styles/app.css",
        "/ads/banner.gif",
        "/tracking/pixel.gif",
        "/analytics.js",
        "/beacon.js",
    ];
    const REQUEST_TYPES: &[RequestType] = &[
        RequestType::MAIN_FRAME,
        RequestType::SUBDOCUMENT,
        RequestType::SCRIPT,
        RequestType::STYLESHEET,
        RequestType::IMAGE,
        RequestType::XMLHTTPREQUEST,
        RequestType::FONT,
        RequestType::PING,
    ];

    let mut rng = create_rng(seed);
    let mut requests = Vec::with_capacity(count);

    for _ in 0..count {
        let is_ad_request = rng() < 0.3;
        let domain = if is_ad_request {
            pick(AD_DOMAINS, &mut rng)
        } else {
            pick(CLEAN_DOMAINS, &mut rng)
        };
        let path = pick(PATHS, &mut rng);
        let request_type = pick(REQUEST_TYPES, &mut rng);
        let query = if rng() < 0.4 {
            format!("?id={}", rand_alnum(&mut rng, 12))
        } else {
            String::new()
        };

        let document_url = if request_type == RequestType::MAIN_FRAME {
            String::new()
        } else if rng() < 0.6 {
            format!("https://{}/", pick(CLEAN_DOMAINS, &mut rng))
        } else {
            format!("https://{}/", domain)
        };

        requests.push(BenchRequest {
            url: format!("https://{}{}{}", domain, path, query),
            document_url,
            request_type,
        });
    }

    requests
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_nearest_rank() {
        let values: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(percentile(&values, 0.50), 50.0);
        assert_eq!(percentile(&values, 0.99), 99.0);
        assert_eq!(percentile(&[], 0.5), 0.0);
    }

    #[test]
    fn requests_are_deterministic() {
        let a = generate_test_requests(50, 7);
        let b = generate_test_requests(50, 7);
        assert!(a.iter().zip(&b).all(|(x, y)| x.url == y.url && x.request_type == y.request_type));
        assert!(a.iter().all(|r| r.url.starts_with("https://")));
    }
}
