use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LinesCodec};
use ulid::Ulid;

type Conn = Framed<TcpStream, LinesCodec>;

async fn connect(host: &str, port: u16, owner: &str) -> Conn {
    let socket = TcpStream::connect((host, port)).await.expect("connect failed");
    let mut conn = Framed::new(socket, LinesCodec::new());
    let password = std::env::var("SLOTBOOK_PASSWORD").unwrap_or_else(|_| "slotbook".into());
    let reply = call(&mut conn, &format!("AUTH {owner} {password}")).await;
    assert!(reply.starts_with("OK"), "auth failed: {reply}");
    conn
}

async fn call(conn: &mut Conn, line: &str) -> String {
    conn.send(line.to_string()).await.expect("send failed");
    match conn.next().await {
        Some(Ok(reply)) => reply,
        other => panic!("no reply to {line:?}: {other:?}"),
    }
}

/// A fresh owner address so every run gets its own profiles.
fn fresh_owner() -> String {
    format!("0x{:040x}", Ulid::new().0 & ((1u128 << 120) - 1))
}

fn fresh_handle() -> String {
    let id = Ulid::new().to_string().to_lowercase();
    format!("bench-{}", &id[10..])
}

async fn create_profile(conn: &mut Conn) -> u64 {
    let reply = call(conn, &format!("PROFILE CREATE {}", fresh_handle())).await;
    let json = reply.strip_prefix("OK ").expect("profile create failed");
    let profile: serde_json::Value = serde_json::from_str(json).expect("bad profile json");
    profile["id"].as_u64().expect("missing profile id")
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

/// Bucket key for the n-th day after 2030-01-01.
fn day(n: usize) -> String {
    let base = chrono::NaiveDate::from_ymd_opt(2030, 1, 1).expect("valid date");
    (base + chrono::Days::new(n as u64)).format("%Y-%m-%d").to_string()
}

async fn phase1_sequential(host: &str, port: u16) {
    let owner = fresh_owner();
    let mut conn = connect(host, port, &owner).await;
    let profile_id = create_profile(&mut conn).await;

    let n = 2400;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    // 10 slots per lock, 24 locks fill one day
    for i in 0..n {
        let bucket = day(i / 24);
        let slot = (i % 24) * 10;
        let t = Instant::now();
        let reply = call(&mut conn, &format!("LOCK {profile_id} {bucket} {slot} 10")).await;
        latencies.push(t.elapsed());
        assert_eq!(reply, "OK", "lock {i} failed");
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} locks in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("lock latency", &mut latencies);
}

async fn phase2_contention(host: &str, port: u16) {
    let n_tasks = 10;
    let n_buckets = 200;

    let owner = fresh_owner();
    let mut setup = connect(host, port, &owner).await;
    let profile_id = create_profile(&mut setup).await;
    drop(setup);

    let wins = Arc::new(AtomicUsize::new(0));
    let conflicts = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    let mut handles = Vec::new();

    // Every task races for the same range of every bucket
    for _ in 0..n_tasks {
        let host = host.to_string();
        let owner = owner.clone();
        let wins = wins.clone();
        let conflicts = conflicts.clone();
        handles.push(tokio::spawn(async move {
            let mut conn = connect(&host, port, &owner).await;
            for b in 0..n_buckets {
                let reply = call(&mut conn, &format!("LOCK {profile_id} {} 100 10", day(b))).await;
                if reply == "OK" {
                    wins.fetch_add(1, Ordering::Relaxed);
                } else if reply.starts_with("ERR slot_conflict") {
                    conflicts.fetch_add(1, Ordering::Relaxed);
                } else {
                    panic!("unexpected reply: {reply}");
                }
            }
        }));
    }

    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let total = n_tasks * n_buckets;
    let wins = wins.load(Ordering::Relaxed);
    let conflicts = conflicts.load(Ordering::Relaxed);
    println!(
        "  {n_tasks} tasks x {n_buckets} buckets = {total} attempts in {:.2}s = {:.0} ops/sec",
        elapsed.as_secs_f64(),
        total as f64 / elapsed.as_secs_f64()
    );
    println!("  {wins} locked, {conflicts} conflicts");
    assert_eq!(wins, n_buckets, "each bucket must have exactly one winner");
}

async fn phase3_read_under_load(host: &str, port: u16) {
    let owner = fresh_owner();
    let mut setup = connect(host, port, &owner).await;
    let profile_id = create_profile(&mut setup).await;
    drop(setup);

    let done = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..4 {
        let host = host.to_string();
        let owner = owner.clone();
        let done = done.clone();
        writer_handles.push(tokio::spawn(async move {
            let mut conn = connect(&host, port, &owner).await;
            let mut i = 0usize;
            while !done.load(Ordering::Relaxed) {
                let bucket = day(1000 + w * 10_000 + i / 240);
                let _ = call(&mut conn, &format!("LOCK {profile_id} {bucket} {} 1", i % 240)).await;
                i += 1;
            }
        }));
    }

    let mut reader_handles = Vec::new();
    for r in 0..4 {
        let host = host.to_string();
        reader_handles.push(tokio::spawn(async move {
            let mut conn = connect(&host, port, &fresh_owner()).await;
            let mut latencies = Vec::with_capacity(500);
            for i in 0..500 {
                let bucket = day(1000 + r * 10_000);
                let t = Instant::now();
                let mask = call(&mut conn, &format!("MASK {profile_id} {bucket}")).await;
                let mask = mask.strip_prefix("OK ").expect("mask failed").to_string();
                let reply = call(&mut conn, &format!("CHECK {mask} {} 5", i % 235)).await;
                latencies.push(t.elapsed());
                assert!(reply.starts_with("OK"), "check failed: {reply}");
            }
            latencies
        }));
    }

    let mut all = Vec::new();
    for h in reader_handles {
        all.extend(h.await.unwrap());
    }
    done.store(true, Ordering::Relaxed);
    for h in writer_handles {
        h.await.unwrap();
    }

    print_latency("read latency (MASK + CHECK)", &mut all);
}

async fn phase4_connection_storm(host: &str, port: u16) {
    let n_conns = 200;
    let ops_per_conn = 5;
    let ok = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    let mut handles = Vec::new();

    for _ in 0..n_conns {
        let host = host.to_string();
        let ok = ok.clone();
        handles.push(tokio::spawn(async move {
            let Ok(socket) = TcpStream::connect((host.as_str(), port)).await else {
                return;
            };
            let mut conn = Framed::new(socket, LinesCodec::new());
            let password = std::env::var("SLOTBOOK_PASSWORD").unwrap_or_else(|_| "slotbook".into());
            if conn.send(format!("AUTH {} {password}", fresh_owner())).await.is_err() {
                return;
            }
            if !matches!(conn.next().await, Some(Ok(ref r)) if r.starts_with("OK")) {
                return;
            }
            for i in 0..ops_per_conn {
                if conn.send(format!("CHECK 5 {} 1", i + 1)).await.is_err() {
                    return;
                }
                if !matches!(conn.next().await, Some(Ok(_))) {
                    return;
                }
            }
            let _ = conn.send("QUIT".to_string()).await;
            ok.fetch_add(1, Ordering::Relaxed);
        }));
    }

    for h in handles {
        let _ = h.await;
    }

    let elapsed = start.elapsed();
    let ok = ok.load(Ordering::Relaxed);
    println!(
        "  {n_conns} connections, {ops_per_conn} ops each: {ok}/{n_conns} succeeded in {:.2}s",
        elapsed.as_secs_f64()
    );
}

#[tokio::main]
async fn main() {
    let host = std::env::var("SLOTBOOK_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port: u16 = std::env::var("SLOTBOOK_PORT")
        .unwrap_or_else(|_| "7433".into())
        .parse()
        .expect("invalid SLOTBOOK_PORT");

    println!("=== slotbook stress benchmark ===");
    println!("target: {host}:{port}\n");

    // Each phase uses its own owner and profile to avoid interference

    println!("[phase 1] sequential lock throughput");
    phase1_sequential(&host, port).await;

    println!("\n[phase 2] contended locks");
    phase2_contention(&host, port).await;

    println!("\n[phase 3] read latency under write load");
    phase3_read_under_load(&host, port).await;

    println!("\n[phase 4] connection storm");
    phase4_connection_storm(&host, port).await;

    println!("\n=== benchmark complete ===");
}
