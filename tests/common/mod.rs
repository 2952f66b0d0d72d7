//! Shared helpers for the integration suites: a store that fails on demand
//! and a minimal in-process RESP server backed by `MemoryStore`.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use mgetperf::config::{Backend, RunConfig};
use mgetperf::fixture::FixtureSpec;
use mgetperf::report::OutputFormat;
use mgetperf::store::resp::{parse_frame, Frame};
use mgetperf::store::{MemoryStore, RedisOptions, ScanPage, Store};
use mgetperf::worker::WARMUP_KEY;
use mgetperf::StoreError;

pub fn run_config(pool_size: usize, value_size: usize, cycles: usize) -> RunConfig {
    RunConfig {
        backend: Backend::Memory,
        redis: RedisOptions::default(),
        fixture: FixtureSpec { prefix: "test".into(), pool_size, value_size },
        cycles,
        format: OutputFormat::Text,
        reset: false,
    }
}

/// Wraps a `MemoryStore` and fails every batched read after the first
/// `ok_reads` of them. Warm-up reads, writes and deletes can be made to fail
/// with the switches below.
pub struct FailingStore {
    pub inner: MemoryStore,
    ok_reads: u64,
    reads: AtomicU64,
    warmups: AtomicU64,
    pub fail_warmups: AtomicBool,
    pub fail_sets: AtomicBool,
    pub fail_deletes: AtomicBool,
}

impl FailingStore {
    pub fn new(ok_reads: u64) -> Self {
        Self {
            inner: MemoryStore::new(4),
            ok_reads,
            reads: AtomicU64::new(0),
            warmups: AtomicU64::new(0),
            fail_warmups: AtomicBool::new(false),
            fail_sets: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
        }
    }

    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Warm-up reads rejected while `fail_warmups` was set.
    pub fn failed_warmups(&self) -> u64 {
        self.warmups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for FailingStore {
    async fn batch_read(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        if self.fail_warmups.load(Ordering::SeqCst) && keys.len() == 1 && keys[0] == WARMUP_KEY {
            self.warmups.fetch_add(1, Ordering::SeqCst);
            return Err(StoreError::Server("ERR simulated warm-up failure".into()));
        }
        let n = self.reads.fetch_add(1, Ordering::SeqCst);
        if n >= self.ok_reads {
            return Err(StoreError::Server("LOADING simulated failure".into()));
        }
        self.inner.batch_read(keys).await
    }

    async fn scan_prefix(&self, prefix: &str, cursor: u64, count: usize) -> Result<ScanPage, StoreError> {
        self.inner.scan_prefix(prefix, cursor, count).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        if self.fail_sets.load(Ordering::SeqCst) {
            return Err(StoreError::Server("OOM simulated write failure".into()));
        }
        self.inner.set(key, value).await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::Server("READONLY simulated delete failure".into()));
        }
        self.inner.delete(keys).await
    }
}

fn encode_reply(buf: &mut Vec<u8>, frame: &Frame) {
    match frame {
        Frame::Simple(s) => buf.extend_from_slice(format!("+{s}\r\n").as_bytes()),
        Frame::Error(e) => buf.extend_from_slice(format!("-{e}\r\n").as_bytes()),
        Frame::Integer(i) => buf.extend_from_slice(format!(":{i}\r\n").as_bytes()),
        Frame::Null => buf.extend_from_slice(b"$-1\r\n"),
        Frame::Bulk(b) => {
            buf.extend_from_slice(format!("${}\r\n", b.len()).as_bytes());
            buf.extend_from_slice(b);
            buf.extend_from_slice(b"\r\n");
        }
        Frame::Array(items) => {
            buf.extend_from_slice(format!("*{}\r\n", items.len()).as_bytes());
            for item in items {
                encode_reply(buf, item);
            }
        }
    }
}

fn unescape_glob(pattern: &str) -> String {
    let body = pattern.strip_suffix('*').unwrap_or(pattern);
    let mut out = String::new();
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn bulk_args(frame: Frame) -> Option<Vec<Vec<u8>>> {
    match frame {
        Frame::Array(items) => items
            .into_iter()
            .map(|f| match f {
                Frame::Bulk(b) => Some(b),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

async fn execute(store: &MemoryStore, password: Option<&str>, authed: &mut bool, args: Vec<Vec<u8>>) -> Frame {
    let Some(cmd) = args.first() else {
        return Frame::Error("ERR empty command".into());
    };
    let cmd = String::from_utf8_lossy(cmd).to_ascii_uppercase();
    let text = |i: usize| String::from_utf8_lossy(&args[i]).into_owned();
    if cmd == "AUTH" {
        return if Some(text(1).as_str()) == password {
            *authed = true;
            Frame::Simple("OK".into())
        } else {
            Frame::Error("WRONGPASS invalid password".into())
        };
    }
    if password.is_some() && !*authed {
        return Frame::Error("NOAUTH Authentication required.".into());
    }
    match cmd.as_str() {
        "SELECT" => Frame::Simple("OK".into()),
        "MGET" => {
            let keys: Vec<String> = (1..args.len()).map(text).collect();
            match store.batch_read(&keys).await {
                Ok(values) => Frame::Array(
                    values.into_iter().map(|v| v.map(Frame::Bulk).unwrap_or(Frame::Null)).collect(),
                ),
                Err(e) => Frame::Error(format!("ERR {e}")),
            }
        }
        "SET" if args.len() == 3 => {
            let _ = store.set(&text(1), &args[2]).await;
            Frame::Simple("OK".into())
        }
        "DEL" => {
            let keys: Vec<String> = (1..args.len()).map(text).collect();
            let n = store.delete(&keys).await.unwrap_or(0);
            Frame::Integer(n as i64)
        }
        "SCAN" if args.len() == 6 => {
            let cursor: u64 = text(1).parse().unwrap_or(0);
            let prefix = unescape_glob(&text(3));
            let page = store.scan_prefix(&prefix, cursor, 0).await.unwrap_or_default();
            Frame::Array(vec![
                Frame::Bulk(page.cursor.to_string().into_bytes()),
                Frame::Array(page.keys.into_iter().map(|k| Frame::Bulk(k.into_bytes())).collect()),
            ])
        }
        _ => Frame::Error(format!("ERR unknown command '{cmd}'")),
    }
}

async fn handle_client(store: Arc<MemoryStore>, password: Option<String>, mut stream: TcpStream) {
    let mut buf = BytesMut::with_capacity(4096);
    let mut authed = false;
    loop {
        match parse_frame(&buf) {
            Ok(Some((frame, used))) => {
                buf.advance(used);
                let reply = match bulk_args(frame) {
                    Some(args) => execute(&store, password.as_deref(), &mut authed, args).await,
                    None => Frame::Error("ERR protocol error".into()),
                };
                let mut out = Vec::new();
                encode_reply(&mut out, &reply);
                if stream.write_all(&out).await.is_err() {
                    break;
                }
            }
            Ok(None) => match stream.read_buf(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            },
            Err(_) => break,
        }
    }
    let _ = stream.shutdown().await;
}

/// A RESP server on an ephemeral localhost port.
pub struct FakeRedis {
    pub store: Arc<MemoryStore>,
    pub port: u16,
}

impl FakeRedis {
    pub async fn start(password: Option<&str>) -> Self {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let store = Arc::new(MemoryStore::new(8));
        let server_store = store.clone();
        let password = password.map(str::to_string);
        tokio::spawn(async move {
            loop {
                let Ok((sock, _)) = listener.accept().await else { break };
                let s = server_store.clone();
                let p = password.clone();
                tokio::spawn(async move { handle_client(s, p, sock).await });
            }
        });
        FakeRedis { store, port }
    }

    pub fn options(&self) -> RedisOptions {
        RedisOptions { host: "127.0.0.1".into(), port: self.port, password: None, db: 0 }
    }
}
