use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio_postgres::error::SqlState;
use tokio_postgres::{Config, NoTls};
use ulid::Ulid;

const DAY: i64 = 86_400_000; // 1 day in ms
const YEAR: i64 = 365 * DAY;

async fn connect(host: &str, port: u16) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(host)
        .port(port)
        .dbname("loadline")
        .user("bench")
        .password(std::env::var("LOADLINE_PASSWORD").unwrap_or_else(|_| "loadline".into()));

    let (client, conn) = config.connect(NoTls).await.expect("connect failed");
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            eprintln!("connection error: {e}");
        }
    });
    client
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

struct Fixture {
    project: Ulid,
    engineers: Vec<Ulid>,
}

async fn insert_engineer(client: &tokio_postgres::Client, skills: &str) -> Ulid {
    let id = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO people (id, name, role, skills, seniority) VALUES ('{id}', 'Engineer {id}', 'engineer', '{skills}', 'mid')"
        ))
        .await
        .unwrap();
    id
}

async fn setup(client: &tokio_postgres::Client) -> Fixture {
    let manager = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO people (id, name, role) VALUES ('{manager}', 'Bench Manager', 'manager')"
        ))
        .await
        .unwrap();

    let project = Ulid::new();
    client
        .batch_execute(&format!(
            r#"INSERT INTO projects (id, name, manager_id, start, "end", team_size, required_skills, status)
               VALUES ('{project}', 'Bench', '{manager}', 0, {}, 50, 'Rust,Go', 'active')"#,
            50 * YEAR
        ))
        .await
        .unwrap();

    let skill_sets = ["Rust", "Go", "Rust,Go", "Python", "Rust,Python"];
    let mut engineers = Vec::new();
    for i in 0..50 {
        engineers.push(insert_engineer(client, skill_sets[i % skill_sets.len()]).await);
    }

    println!("  created {} engineers and 1 project", engineers.len());
    Fixture { project, engineers }
}

fn engagement_sql(person: Ulid, project: Ulid, allocation: u32, start: i64, end: i64) -> String {
    format!(
        r#"INSERT INTO engagements (person_id, project_id, allocation, start, "end") VALUES ('{person}', '{project}', {allocation}, {start}, {end})"#
    )
}

async fn phase1_sequential(host: &str, port: u16, fixture: &Fixture) {
    let client = connect(host, port).await;
    let person = insert_engineer(&client, "Rust").await;

    let n = 2000;
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    // Back-to-back, non-overlapping days at full allocation.
    for i in 0..n {
        let s = (i as i64) * DAY;
        let e = s + DAY - 1;
        let t = Instant::now();
        client
            .batch_execute(&engagement_sql(person, fixture.project, 100, s, e))
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    let ops = n as f64 / elapsed.as_secs_f64();
    println!("  {n} engagements in {:.2}s = {ops:.0} ops/sec", elapsed.as_secs_f64());
    print_latency("write latency", &mut latencies);
}

/// Many clients race for the same person and window. Exactly
/// `100 / allocation` admissions may succeed.
async fn phase2_contention(host: &str, port: u16, fixture: &Fixture) {
    let setup_client = connect(host, port).await;
    let person = insert_engineer(&setup_client, "Go").await;
    drop(setup_client);

    let n_tasks = 50;
    let allocation = 10;
    let accepted = Arc::new(AtomicUsize::new(0));
    let rejected = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let mut handles = Vec::new();
    for _ in 0..n_tasks {
        let host = host.to_string();
        let project = fixture.project;
        let accepted = accepted.clone();
        let rejected = rejected.clone();
        handles.push(tokio::spawn(async move {
            let client = connect(&host, port).await;
            match client
                .batch_execute(&engagement_sql(person, project, allocation, 0, 30 * DAY))
                .await
            {
                Ok(()) => {
                    accepted.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) if e.code() == Some(&SqlState::CHECK_VIOLATION) => {
                    rejected.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let elapsed = start.elapsed();
    let ok = accepted.load(Ordering::Relaxed);
    let no = rejected.load(Ordering::Relaxed);
    println!(
        "  {n_tasks} concurrent {allocation}% requests: {ok} accepted, {no} rejected in {:.2}s",
        elapsed.as_secs_f64()
    );
    assert_eq!(ok, (100 / allocation) as usize, "capacity invariant violated");
}

async fn phase3_read_under_load(host: &str, port: u16, fixture: &Fixture) {
    // Writers: keep booking small slices for distinct engineers.
    let stop = Arc::new(AtomicBool::new(false));
    let mut writer_handles = Vec::new();
    for w in 0..5 {
        let host = host.to_string();
        let stop = stop.clone();
        let project = fixture.project;
        let person = fixture.engineers[w];
        writer_handles.push(tokio::spawn(async move {
            let client = connect(&host, port).await;
            let mut i = 0i64;
            while !stop.load(Ordering::Relaxed) {
                let s = (YEAR + i * DAY) % (40 * YEAR);
                let _ = client
                    .batch_execute(&engagement_sql(person, project, 1, s, s + DAY - 1))
                    .await;
                i += 1;
            }
        }));
    }

    let n_readers = 10;
    let reads_per_reader = 300;
    let mut reader_handles = Vec::new();
    for r in 0..n_readers {
        let host = host.to_string();
        reader_handles.push(tokio::spawn(async move {
            let client = connect(&host, port).await;
            let mut latencies = Vec::with_capacity(reads_per_reader);
            for i in 0..reads_per_reader {
                let sql = if (r + i) % 2 == 0 {
                    format!(
                        r#"SELECT * FROM suitable WHERE skills = 'Rust' AND start >= 0 AND "end" <= {} AND capacity = 20"#,
                        YEAR
                    )
                } else {
                    format!("SELECT * FROM utilization WHERE at = {}", YEAR / 2)
                };
                let t = Instant::now();
                client.simple_query(&sql).await.unwrap();
                latencies.push(t.elapsed());
            }
            latencies
        }));
    }

    let mut all_latencies = Vec::new();
    for h in reader_handles {
        all_latencies.extend(h.await.unwrap());
    }

    stop.store(true, Ordering::Relaxed);
    for h in writer_handles {
        let _ = h.await;
    }

    print_latency("suitable / utilization query", &mut all_latencies);
}

async fn phase4_connection_storm(host: &str, port: u16, fixture: &Fixture) {
    let n_conns = 50;
    let ops_per_conn = 10;

    let start = Instant::now();
    let mut handles = Vec::new();
    let success = Arc::new(AtomicUsize::new(0));

    for _ in 0..n_conns {
        let host = host.to_string();
        let success = success.clone();
        let project = fixture.project;
        handles.push(tokio::spawn(async move {
            let client = connect(&host, port).await;
            let person = insert_engineer(&client, "Go").await;
            for i in 0..ops_per_conn {
                let s = (i as i64) * DAY;
                client
                    .batch_execute(&engagement_sql(person, project, 10, s, s + DAY - 1))
                    .await
                    .unwrap();
            }
            success.fetch_add(1, Ordering::Relaxed);
        }));
    }

    for h in handles {
        let _ = h.await;
    }

    let elapsed = start.elapsed();
    let ok = success.load(Ordering::Relaxed);
    println!(
        "  {n_conns} connections, {ops_per_conn} ops each: {ok}/{n_conns} succeeded in {:.2}s",
        elapsed.as_secs_f64()
    );
}

#[tokio::main]
async fn main() {
    let host = std::env::var("LOADLINE_HOST").unwrap_or_else(|_| "127.0.0.1".into());
    let port: u16 = std::env::var("LOADLINE_PORT")
        .unwrap_or_else(|_| "5433".into())
        .parse()
        .expect("invalid LOADLINE_PORT");

    println!("=== loadline stress benchmark ===");
    println!("target: {host}:{port}\n");

    println!("[setup]");
    let setup_client = connect(&host, port).await;
    let fixture = setup(&setup_client).await;
    drop(setup_client);

    println!("\n[phase 1] sequential admission throughput");
    phase1_sequential(&host, port, &fixture).await;

    println!("\n[phase 2] concurrent admissions for one person");
    phase2_contention(&host, port, &fixture).await;

    println!("\n[phase 3] read latency under write load");
    phase3_read_under_load(&host, port, &fixture).await;

    println!("\n[phase 4] connection storm");
    phase4_connection_storm(&host, port, &fixture).await;

    println!("\n=== benchmark complete ===");
}
