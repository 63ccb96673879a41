//! Client for the external Redis service
//!
//! One TCP connection, one request in flight at a time. Each request is
//! bounded by the timeout given at connect time.

use super::CacheBackend;
use crate::config::RedisEndpoint;
use crate::error::{CacheError, CacheResult};
use crate::protocol::{RespEncoder, RespParser, RespValue};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

/// Longest expiry sent to the server
///
/// Redis rejects a deadline that overflows its millisecond clock. Anything
/// longer is stored without expiry, as the local store does on overflow.
const MAX_EXPIRY_MILLIS: u128 = (i64::MAX / 2) as u128;

/// Connection state guarded by the client mutex
struct Connection {
    stream: TcpStream,
    read_buffer: BytesMut,
    write_buffer: BytesMut,
}

impl Connection {
    /// Send one command and wait for its reply
    ///
    /// Error replies come back as `CacheError::Server`.
    async fn round_trip(&mut self, command: &RespValue) -> CacheResult<RespValue> {
        self.write_buffer.clear();
        RespEncoder::encode_to(&mut self.write_buffer, command);
        self.stream.write_all(&self.write_buffer).await?;
        self.stream.flush().await?;

        loop {
            if let Some(reply) = RespParser::parse(&mut self.read_buffer)? {
                return match reply {
                    RespValue::Error(msg) => Err(CacheError::Server(msg)),
                    reply => Ok(reply),
                };
            }

            if self.stream.read_buf(&mut self.read_buffer).await? == 0 {
                return Err(CacheError::ConnectionClosed);
            }
        }
    }
}

/// Remote cache backend speaking RESP2
pub struct RedisCache {
    endpoint: RedisEndpoint,
    timeout: Duration,
    conn: Mutex<Connection>,
}

impl RedisCache {
    /// Open a connection, authenticate and select the database if the
    /// endpoint asks for it
    pub async fn connect(endpoint: RedisEndpoint, timeout: Duration) -> CacheResult<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(endpoint.address()))
            .await
            .map_err(|_| CacheError::Timeout)??;
        stream.set_nodelay(true)?;

        let client = RedisCache {
            endpoint,
            timeout,
            conn: Mutex::new(Connection {
                stream,
                read_buffer: BytesMut::with_capacity(4096),
                write_buffer: BytesMut::with_capacity(4096),
            }),
        };

        if let Some(password) = &client.endpoint.password {
            let mut auth = vec!["AUTH"];
            if let Some(user) = &client.endpoint.username {
                auth.push(user);
            }
            auth.push(password);
            let reply = client.request(RespValue::command(auth)).await?;
            expect_ok("AUTH", reply)?;
        }

        if let Some(db) = client.endpoint.db {
            let reply = client
                .request(RespValue::command(["SELECT".to_string(), db.to_string()]))
                .await?;
            expect_ok("SELECT", reply)?;
        }

        debug!("Connected to {}", client.endpoint);
        Ok(client)
    }

    async fn request(&self, command: RespValue) -> CacheResult<RespValue> {
        let mut conn = self.conn.lock().await;
        tokio::time::timeout(self.timeout, conn.round_trip(&command))
            .await
            .map_err(|_| CacheError::Timeout)?
    }
}

/// `PX` argument for `ttl`, or `None` for a key without expiry
///
/// Zero means no expiry, as for the local store. Sub-millisecond TTLs round
/// up to 1 ms since the server rejects `PX 0`.
fn expiry_millis(ttl: Option<Duration>) -> Option<u128> {
    let ttl = ttl.filter(|ttl| !ttl.is_zero())?;
    let millis = ttl.as_millis().max(1);
    (millis <= MAX_EXPIRY_MILLIS).then_some(millis)
}

fn unexpected(command: &'static str, reply: RespValue) -> CacheError {
    CacheError::UnexpectedReply {
        command,
        reply: reply.to_string(),
    }
}

fn expect_ok(command: &'static str, reply: RespValue) -> CacheResult<bool> {
    if reply.is_ok() {
        Ok(true)
    } else {
        Err(unexpected(command, reply))
    }
}

fn expect_count(command: &'static str, reply: RespValue) -> CacheResult<i64> {
    match reply {
        RespValue::Integer(n) if n >= 0 => Ok(n),
        other => Err(unexpected(command, other)),
    }
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> CacheResult<bool> {
        let mut parts = vec![
            RespValue::bulk_string("SET"),
            RespValue::BulkString(Bytes::copy_from_slice(key.as_bytes())),
            RespValue::BulkString(value),
        ];
        if let Some(millis) = expiry_millis(ttl) {
            parts.push(RespValue::bulk_string("PX"));
            parts.push(RespValue::bulk_string(millis.to_string()));
        }

        match self.request(RespValue::Array(parts)).await? {
            RespValue::Null => Ok(false),
            reply => expect_ok("SET", reply),
        }
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Bytes>> {
        match self.request(RespValue::command(["GET", key])).await? {
            RespValue::BulkString(value) => Ok(Some(value)),
            RespValue::Null => Ok(None),
            other => Err(unexpected("GET", other)),
        }
    }

    async fn delete(&self, keys: &[&str]) -> CacheResult<usize> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut parts = Vec::with_capacity(keys.len() + 1);
        parts.push("DEL");
        parts.extend_from_slice(keys);

        let reply = self.request(RespValue::command(parts)).await?;
        Ok(expect_count("DEL", reply)? as usize)
    }

    async fn exists(&self, key: &str) -> CacheResult<bool> {
        let reply = self.request(RespValue::command(["EXISTS", key])).await?;
        Ok(expect_count("EXISTS", reply)? > 0)
    }

    async fn flush_all(&self) -> CacheResult<bool> {
        let reply = self.request(RespValue::command(["FLUSHALL"])).await?;
        expect_ok("FLUSHALL", reply)
    }

    async fn keys(&self, pattern: &str) -> CacheResult<Vec<String>> {
        match self.request(RespValue::command(["KEYS", pattern])).await? {
            RespValue::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    RespValue::BulkString(key) => Ok(String::from_utf8_lossy(&key).into_owned()),
                    other => Err(unexpected("KEYS", other)),
                })
                .collect(),
            other => Err(unexpected("KEYS", other)),
        }
    }

    async fn ping(&self) -> CacheResult<bool> {
        match self.request(RespValue::command(["PING"])).await? {
            RespValue::SimpleString(s) if s == "PONG" => Ok(true),
            other => Err(unexpected("PING", other)),
        }
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::{FakeBehavior, FakeRedis};
    use std::collections::HashSet;
    use tokio_test::assert_ok;

    const TIMEOUT: Duration = Duration::from_secs(2);

    async fn client_for(server: &FakeRedis) -> RedisCache {
        let endpoint = RedisEndpoint::parse(&server.url()).unwrap();
        RedisCache::connect(endpoint, TIMEOUT).await.unwrap()
    }

    #[tokio::test]
    async fn test_operation_surface() {
        let server = FakeRedis::start().await;
        let client = client_for(&server).await;

        assert!(assert_ok!(client.ping().await));
        assert!(assert_ok!(client.set("a", Bytes::from("1"), None).await));
        assert!(assert_ok!(client.set("ab", Bytes::from("3"), None).await));
        assert!(assert_ok!(client.set("b", Bytes::from("2"), None).await));
        assert_eq!(server.store.get("ab"), Some(Bytes::from("3")));

        assert_eq!(client.get("a").await.unwrap(), Some(Bytes::from("1")));
        assert_eq!(client.get("zzz").await.unwrap(), None);
        assert!(client.exists("b").await.unwrap());

        let keys: HashSet<String> = client.keys("a*").await.unwrap().into_iter().collect();
        assert_eq!(keys, HashSet::from(["a".to_string(), "ab".to_string()]));

        assert_eq!(client.delete(&["a", "missing"]).await.unwrap(), 1);
        assert_eq!(client.delete(&[]).await.unwrap(), 0);
        assert!(!client.exists("a").await.unwrap());

        assert!(client.flush_all().await.unwrap());
        assert!(client.keys("*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ttl_is_sent_as_milliseconds() {
        let server = FakeRedis::start().await;
        let client = client_for(&server).await;

        client
            .set("session:1", Bytes::from("alice"), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(server.store.stats().volatile_keys, 1);

        client.set("session:1", Bytes::from("alice"), None).await.unwrap();
        assert_eq!(server.store.stats().volatile_keys, 0);

        let sets: Vec<Vec<String>> = server
            .requests()
            .into_iter()
            .filter(|args| args[0] == "SET")
            .collect();
        assert_eq!(sets[0], ["SET", "session:1", "alice", "PX", "60000"]);
        assert_eq!(sets[1], ["SET", "session:1", "alice"]);
    }

    #[tokio::test]
    async fn test_ttl_edges_match_local_store() {
        let server = FakeRedis::start().await;
        let client = client_for(&server).await;

        // Rounded up rather than sent as the rejected `PX 0`
        assert!(assert_ok!(
            client
                .set("brief", Bytes::from("v"), Some(Duration::from_micros(500)))
                .await
        ));
        // Too far out to represent: stored without expiry
        assert!(assert_ok!(
            client
                .set("forever", Bytes::from("v"), Some(Duration::from_secs(u64::MAX)))
                .await
        ));
        assert!(assert_ok!(
            client
                .set("zero", Bytes::from("v"), Some(Duration::ZERO))
                .await
        ));

        let requests = server.requests();
        assert!(requests.contains(&vec![
            "SET".to_string(),
            "brief".to_string(),
            "v".to_string(),
            "PX".to_string(),
            "1".to_string(),
        ]));
        assert!(requests.iter().any(|args| args[..] == ["SET", "forever", "v"]));
        assert!(requests.iter().any(|args| args[..] == ["SET", "zero", "v"]));
        assert!(server.store.exists("forever"));
    }

    #[test]
    fn test_expiry_millis() {
        assert_eq!(expiry_millis(None), None);
        assert_eq!(expiry_millis(Some(Duration::ZERO)), None);
        assert_eq!(expiry_millis(Some(Duration::from_nanos(1))), Some(1));
        assert_eq!(expiry_millis(Some(Duration::from_millis(1500))), Some(1500));
        assert_eq!(expiry_millis(Some(Duration::MAX)), None);
    }

    #[tokio::test]
    async fn test_error_reply_is_server_error() {
        let server = FakeRedis::start_with(FakeBehavior {
            reject_set: Some("READONLY You can't write against a read only replica.".to_string()),
            ..Default::default()
        })
        .await;
        let client = client_for(&server).await;

        let err = client.set("k", Bytes::from("v"), None).await.unwrap_err();
        assert!(matches!(err, CacheError::Server(ref msg) if msg.starts_with("READONLY")));
        assert!(!err.is_connectivity());
    }

    #[tokio::test]
    async fn test_auth_from_url() {
        let server = FakeRedis::start_with(FakeBehavior {
            password: Some("s3cret".to_string()),
            ..Default::default()
        })
        .await;

        let endpoint = RedisEndpoint::parse(&format!("redis://:s3cret@{}/1", server.addr)).unwrap();
        let client = RedisCache::connect(endpoint, TIMEOUT).await.unwrap();
        assert!(client.ping().await.unwrap());

        let endpoint = RedisEndpoint::parse(&format!("redis://:wrong@{}", server.addr)).unwrap();
        assert!(matches!(
            RedisCache::connect(endpoint, TIMEOUT).await,
            Err(CacheError::Server(_))
        ));
    }

    #[tokio::test]
    async fn test_silent_server_times_out() {
        let server = FakeRedis::start_with(FakeBehavior {
            silent: true,
            ..Default::default()
        })
        .await;
        let endpoint = RedisEndpoint::parse(&server.url()).unwrap();
        let client = RedisCache::connect(endpoint, Duration::from_millis(100)).await.unwrap();

        assert!(matches!(client.ping().await, Err(CacheError::Timeout)));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let endpoint = RedisEndpoint::parse(&format!("redis://{}", addr)).unwrap();
        let err = RedisCache::connect(endpoint, TIMEOUT).await.err().unwrap();
        assert!(err.is_connectivity());
    }
}
