//! Redis backend speaking RESP2 over tokio TCP.
//!
//! All workers share one `RedisStore`. Each call checks a connection out of
//! the idle pool (dialing a new one when the pool is empty) and puts it back
//! once a complete reply was read. A connection that failed mid-reply is
//! dropped instead of being returned.

use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use super::resp::{encode_command, glob_escape, parse_frame, Frame};
use super::{ScanPage, Store};
use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisOptions {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: u32,
}

impl Default for RedisOptions {
    fn default() -> Self {
        Self { host: "127.0.0.1".into(), port: 6379, password: None, db: 0 }
    }
}

impl RedisOptions {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A single RESP connection.
pub struct Connection {
    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl Connection {
    pub async fn connect(opts: &RedisOptions) -> Result<Self, StoreError> {
        let stream = TcpStream::connect(opts.addr()).await?;
        stream.set_nodelay(true)?;
        let mut conn = Connection {
            stream,
            read_buf: BytesMut::with_capacity(16 * 1024),
            write_buf: BytesMut::with_capacity(4 * 1024),
        };
        if let Some(password) = &opts.password {
            conn.call_ok("AUTH", &[b"AUTH", password.as_bytes()]).await?;
        }
        if opts.db != 0 {
            let db = opts.db.to_string();
            conn.call_ok("SELECT", &[b"SELECT", db.as_bytes()]).await?;
        }
        Ok(conn)
    }

    /// Send one command and read its reply. Server error replies are returned
    /// as `Frame::Error`, not as `Err`, so the connection stays usable.
    pub async fn call(&mut self, args: &[&[u8]]) -> Result<Frame, StoreError> {
        self.write_buf.clear();
        encode_command(&mut self.write_buf, args);
        self.stream.write_all(&self.write_buf).await?;
        self.read_frame().await
    }

    async fn call_ok(&mut self, command: &'static str, args: &[&[u8]]) -> Result<(), StoreError> {
        match self.call(args).await? {
            Frame::Simple(_) => Ok(()),
            Frame::Error(e) => Err(StoreError::Server(e)),
            other => Err(StoreError::UnexpectedReply { command, reply: other.describe() }),
        }
    }

    async fn read_frame(&mut self) -> Result<Frame, StoreError> {
        loop {
            if let Some((frame, used)) = parse_frame(&self.read_buf)? {
                self.read_buf.advance(used);
                return Ok(frame);
            }
            if self.stream.read_buf(&mut self.read_buf).await? == 0 {
                return Err(StoreError::ConnectionClosed);
            }
        }
    }
}

pub struct RedisStore {
    opts: RedisOptions,
    idle: Mutex<Vec<Connection>>,
}

impl RedisStore {
    /// Create a store; no connection is made until the first call.
    pub fn new(opts: RedisOptions) -> Self {
        Self { opts, idle: Mutex::new(Vec::new()) }
    }

    /// Number of pooled idle connections.
    pub fn idle_connections(&self) -> usize {
        self.idle.lock().len()
    }

    async fn checkout(&self) -> Result<Connection, StoreError> {
        let pooled = self.idle.lock().pop();
        match pooled {
            Some(conn) => Ok(conn),
            None => {
                debug!(addr = %self.opts.addr(), "dialing new redis connection");
                Connection::connect(&self.opts).await
            }
        }
    }

    async fn command(&self, args: &[&[u8]]) -> Result<Frame, StoreError> {
        let mut conn = self.checkout().await?;
        let frame = conn.call(args).await?;
        self.idle.lock().push(conn);
        match frame {
            Frame::Error(e) => Err(StoreError::Server(e)),
            frame => Ok(frame),
        }
    }
}

fn bulk_string(frame: Frame, command: &'static str) -> Result<String, StoreError> {
    match frame {
        Frame::Bulk(b) => {
            String::from_utf8(b).map_err(|e| StoreError::Protocol(e.to_string()))
        }
        Frame::Simple(s) => Ok(s),
        other => Err(StoreError::UnexpectedReply { command, reply: other.describe() }),
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn batch_read(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>, StoreError> {
        let mut args: Vec<&[u8]> = Vec::with_capacity(keys.len() + 1);
        args.push(b"MGET");
        args.extend(keys.iter().map(|k| k.as_bytes()));
        match self.command(&args).await? {
            Frame::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Frame::Bulk(v) => Ok(Some(v)),
                    Frame::Null => Ok(None),
                    other => Err(StoreError::UnexpectedReply {
                        command: "MGET",
                        reply: other.describe(),
                    }),
                })
                .collect(),
            other => Err(StoreError::UnexpectedReply { command: "MGET", reply: other.describe() }),
        }
    }

    async fn scan_prefix(
        &self,
        prefix: &str,
        cursor: u64,
        count: usize,
    ) -> Result<ScanPage, StoreError> {
        let cursor_arg = cursor.to_string();
        let pattern = format!("{}*", glob_escape(prefix));
        let count_arg = count.to_string();
        let reply = self
            .command(&[
                b"SCAN",
                cursor_arg.as_bytes(),
                b"MATCH",
                pattern.as_bytes(),
                b"COUNT",
                count_arg.as_bytes(),
            ])
            .await?;
        let Frame::Array(mut parts) = reply else {
            return Err(StoreError::UnexpectedReply { command: "SCAN", reply: reply.describe() });
        };
        if parts.len() != 2 {
            return Err(StoreError::UnexpectedReply {
                command: "SCAN",
                reply: format!("array({} items)", parts.len()),
            });
        }
        let keys_frame = parts.pop().unwrap_or(Frame::Null);
        let cursor_frame = parts.pop().unwrap_or(Frame::Null);
        let next = bulk_string(cursor_frame, "SCAN")?
            .parse()
            .map_err(|_| StoreError::Protocol("SCAN cursor is not a number".into()))?;
        let keys = match keys_frame {
            Frame::Array(items) => items
                .into_iter()
                .map(|k| bulk_string(k, "SCAN"))
                .collect::<Result<Vec<_>, _>>()?,
            other => {
                return Err(StoreError::UnexpectedReply { command: "SCAN", reply: other.describe() })
            }
        };
        Ok(ScanPage { cursor: next, keys })
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        match self.command(&[b"SET", key.as_bytes(), value]).await? {
            Frame::Simple(_) => Ok(()),
            other => Err(StoreError::UnexpectedReply { command: "SET", reply: other.describe() }),
        }
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut args: Vec<&[u8]> = Vec::with_capacity(keys.len() + 1);
        args.push(b"DEL");
        args.extend(keys.iter().map(|k| k.as_bytes()));
        match self.command(&args).await? {
            Frame::Integer(n) if n >= 0 => Ok(n as u64),
            other => Err(StoreError::UnexpectedReply { command: "DEL", reply: other.describe() }),
        }
    }
}
