//! # CLI - EchoDB Interactive Shell
//!
//! A REPL-style command-line interface for an EchoDB node. Reads commands
//! from stdin, executes them against the engine, and prints results to
//! stdout. Designed for both interactive use and scripted testing (pipe
//! commands via stdin).
//!
//! ## Commands
//!
//! ```text
//! PUT key value   Insert or update a key-value pair
//! GET key         Look up a key (prints value or "(nil)")
//! DEL key         Delete a key (writes a tombstone)
//! FLUSH           Force flush memtables to new L0 SSTs
//! COMPACT         Trigger manual compaction (L0 + L1 -> L1)
//! STATS           Print leader/sequence/level debug info
//! EXIT / QUIT     Shut down gracefully
//! ```
//!
//! ## Configuration
//!
//! Every setting is read from the environment by [`config::EchoConfig`];
//! see that crate for the full list. `ECHODB_MEMORY=true` runs against an
//! in-process store instead of S3, for local exploration.
use std::sync::Arc;

use anyhow::{Context, Result};
use config::EchoConfig;
use engine::Engine;
use objectstore::StoreHandle;
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = EchoConfig::from_env();
    let store = open_store(&config)?;
    let engine = Engine::open(store, config).await.context("opening engine")?;
    let workers = engine.spawn_background_workers();

    println!(
        "EchoDB node {} started (leader={}, seq={})",
        engine.node_id(),
        engine.is_leader(),
        engine.current_seq()
    );
    println!("Commands: PUT key value | GET key | DEL key | FLUSH | COMPACT | STATS | EXIT");

    if let Err(e) = run_repl(&engine).await {
        tracing::error!(error = %e, "REPL exited with an error");
    }

    engine
        .close(workers, std::time::Duration::from_secs(5))
        .await
        .context("closing engine")?;
    println!("bye");
    Ok(())
}

fn open_store(config: &EchoConfig) -> Result<StoreHandle> {
    if std::env::var("ECHODB_MEMORY").as_deref() == Ok("true") {
        return Ok(objectstore::memory_store());
    }
    objectstore::s3_store(
        &config.store.bucket,
        &config.store.region,
        config.store.endpoint.as_deref(),
    )
    .context("connecting to object store")
}

async fn run_repl<S>(engine: &Arc<Engine<S>>) -> Result<()>
where
    S: objectstore::ObjectStore + Clone + Send + Sync + 'static,
{
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    print!("> ");
    flush_stdout();

    while let Some(line) = lines.next_line().await? {
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some(cmd) => match cmd.to_uppercase().as_str() {
                "PUT" => {
                    let key = parts.next();
                    let value: String = parts.collect::<Vec<_>>().join(" ");
                    match key {
                        Some(key) if !value.is_empty() => {
                            match engine.put(key.as_bytes().to_vec(), value.into_bytes()).await {
                                Ok(()) => println!("OK"),
                                Err(e) => println!("ERR {e}"),
                            }
                        }
                        _ => println!("ERR usage: PUT key value"),
                    }
                }
                "GET" => match parts.next() {
                    Some(key) => match engine.get(key.as_bytes()).await {
                        Ok(Some(v)) => println!("{}", String::from_utf8_lossy(&v)),
                        Ok(None) => println!("(nil)"),
                        Err(e) => println!("ERR {e}"),
                    },
                    None => println!("ERR usage: GET key"),
                },
                "DEL" => match parts.next() {
                    Some(key) => match engine.delete(key.as_bytes().to_vec()).await {
                        Ok(()) => println!("OK"),
                        Err(e) => println!("ERR {e}"),
                    },
                    None => println!("ERR usage: DEL key"),
                },
                "FLUSH" => match engine.flush().await {
                    Ok(()) => println!("OK (L0={})", engine.l0_count()),
                    Err(e) => println!("ERR {e}"),
                },
                "COMPACT" => match engine.compact().await {
                    Ok(()) => println!("OK (L0={}, L1={})", engine.l0_count(), engine.level_count(1)),
                    Err(e) => println!("ERR {e}"),
                },
                "STATS" => println!(
                    "node={} leader={} seq={} l0={} l1={}",
                    engine.node_id(),
                    engine.is_leader(),
                    engine.current_seq(),
                    engine.l0_count(),
                    engine.level_count(1),
                ),
                "EXIT" | "QUIT" => break,
                other => println!("unknown command: {other}"),
            },
            None => {}
        }

        print!("> ");
        flush_stdout();
    }
    Ok(())
}

fn flush_stdout() {
    use std::io::Write;
    std::io::stdout().flush().ok();
}
