//! In-process RESP server used by the remote client and selector tests

use super::LocalCache;
use crate::protocol::{RespEncoder, RespParser, RespValue};
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// How the fake server misbehaves, if at all
#[derive(Debug, Clone, Default)]
pub struct FakeBehavior {
    /// Required password; commands before a matching AUTH get `-NOAUTH`
    pub password: Option<String>,
    /// Answer every SET with this error reply
    pub reject_set: Option<String>,
    /// Echo this instead of the stored value on GET
    pub corrupt_get: Option<Bytes>,
    /// Accept connections but never reply
    pub silent: bool,
    /// Answer every request with these bytes verbatim
    pub raw_reply: Option<Bytes>,
}

/// A Redis look-alike backed by a `LocalCache`
pub struct FakeRedis {
    pub addr: SocketAddr,
    pub store: LocalCache,
    requests: Arc<Mutex<Vec<Vec<String>>>>,
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl FakeRedis {
    pub async fn start() -> Self {
        Self::start_with(FakeBehavior::default()).await
    }

    pub async fn start_with(behavior: FakeBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store = LocalCache::new();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let (shutdown, shutdown_rx) = watch::channel(false);

        let server_store = store.clone();
        let server_requests = requests.clone();
        let handle = tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                let session = Session {
                    store: server_store.clone(),
                    requests: server_requests.clone(),
                    behavior: behavior.clone(),
                    authed: behavior.password.is_none(),
                };
                tokio::spawn(serve(socket, session, shutdown_rx.clone()));
            }
        });

        FakeRedis {
            addr,
            store,
            requests,
            handle,
            shutdown,
        }
    }

    /// `redis://` URL pointing at this server
    pub fn url(&self) -> String {
        format!("redis://{}", self.addr)
    }

    /// Every request received so far, as argument lists
    pub fn requests(&self) -> Vec<Vec<String>> {
        self.requests.lock().clone()
    }

    /// Stop accepting and close every open connection
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
        self.handle.abort();
    }
}

impl Drop for FakeRedis {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Per-connection state
struct Session {
    store: LocalCache,
    requests: Arc<Mutex<Vec<Vec<String>>>>,
    behavior: FakeBehavior,
    authed: bool,
}

async fn serve(mut socket: TcpStream, mut session: Session, mut shutdown: watch::Receiver<bool>) {
    let mut read_buffer = BytesMut::with_capacity(4096);
    let mut write_buffer = BytesMut::with_capacity(4096);

    loop {
        tokio::select! {
            read = socket.read_buf(&mut read_buffer) => match read {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            },
            _ = shutdown.changed() => return,
        }

        while let Ok(Some(frame)) = RespParser::parse(&mut read_buffer) {
            if session.behavior.silent {
                continue;
            }
            write_buffer.clear();
            if let Some(raw) = session.behavior.raw_reply.clone() {
                write_buffer.extend_from_slice(&raw);
            } else {
                let reply = session.answer(frame);
                RespEncoder::encode_to(&mut write_buffer, &reply);
            }
            if socket.write_all(&write_buffer).await.is_err() {
                return;
            }
        }
    }
}

impl Session {
    fn answer(&mut self, frame: RespValue) -> RespValue {
        let args: Vec<String> = match frame {
            RespValue::Array(parts) => parts
                .iter()
                .filter_map(|p| p.as_bulk_string())
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .collect(),
            _ => return RespValue::error("ERR expected array"),
        };
        let Some(name) = args.first().map(|n| n.to_uppercase()) else {
            return RespValue::error("ERR empty command");
        };
        self.requests.lock().push(args.clone());

        if name == "AUTH" {
            let given = args.last().cloned();
            return if self.behavior.password.is_none() || given == self.behavior.password {
                self.authed = true;
                RespValue::simple_string("OK")
            } else {
                RespValue::error("WRONGPASS invalid username-password pair")
            };
        }
        if !self.authed {
            return RespValue::error("NOAUTH Authentication required.");
        }

        let store = &self.store;
        match (name.as_str(), &args[1..]) {
            ("PING", _) => RespValue::simple_string("PONG"),
            ("SELECT", [_]) => RespValue::simple_string("OK"),
            ("SET", [key, value, rest @ ..]) => {
                if let Some(msg) = &self.behavior.reject_set {
                    return RespValue::error(msg.clone());
                }
                let ttl = match rest {
                    [] => None,
                    [opt, n] => {
                        let amount = match n.parse::<i64>() {
                            Ok(amount) if amount > 0 => amount as u64,
                            _ => return RespValue::error("ERR invalid expire time in 'set' command"),
                        };
                        if opt.eq_ignore_ascii_case("PX") {
                            Some(Duration::from_millis(amount))
                        } else if opt.eq_ignore_ascii_case("EX") {
                            Some(Duration::from_secs(amount))
                        } else {
                            return RespValue::error("ERR syntax error");
                        }
                    }
                    _ => return RespValue::error("ERR syntax error"),
                };
                store.set(key.as_str(), value.clone(), ttl);
                RespValue::simple_string("OK")
            }
            ("GET", [key]) => match (&self.behavior.corrupt_get, store.get(key)) {
                (_, None) => RespValue::Null,
                (Some(fake), Some(_)) => RespValue::BulkString(fake.clone()),
                (None, Some(value)) => RespValue::BulkString(value),
            },
            ("DEL", keys) if !keys.is_empty() => RespValue::integer(store.delete(keys) as i64),
            ("EXISTS", [key]) => RespValue::integer(store.exists(key) as i64),
            ("FLUSHALL", []) => {
                store.flush_all();
                RespValue::simple_string("OK")
            }
            ("KEYS", [pattern]) => RespValue::Array(
                store
                    .keys(pattern)
                    .into_iter()
                    .map(RespValue::bulk_string)
                    .collect(),
            ),
            _ => RespValue::error(format!("ERR unknown command '{}'", name)),
        }
    }
}
