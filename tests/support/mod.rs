//! In-process key-value server speaking the wire format the load
//! client emits: space-separated tokens terminated by CRLF, with the
//! trailing argument of SET/LPUSH/HSET given as a byte count line
//! followed by that many raw bytes. Replies are RESP.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{self, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

#[derive(Clone, Copy, Default)]
pub struct MockOptions {
    /// Flip one byte of every string value handed back by GET, to
    /// exercise corruption detection.
    pub corrupt_reads: bool,
    /// Deliver every reply a few bytes at a time, to exercise reply
    /// reassembly across partial reads.
    pub chunked_replies: bool,
}

#[derive(Default)]
struct State {
    strings: HashMap<String, Vec<u8>>,
    lists: HashMap<String, VecDeque<Vec<u8>>>,
    hashes: HashMap<String, HashMap<String, Vec<u8>>>,
}

pub async fn spawn_mock_server(
    opts: MockOptions,
) -> (SocketAddr, oneshot::Sender<()>, tokio::task::JoinHandle<io::Result<()>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind server");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = oneshot::channel();
    let state = Arc::new(Mutex::new(State::default()));
    let handle = tokio::spawn(async move {
        serve(listener, state, opts, async move {
            let _ = rx.await;
        })
        .await
    });
    (addr, tx, handle)
}

async fn serve(
    listener: TcpListener,
    state: Arc<Mutex<State>>,
    opts: MockOptions,
    shutdown: impl std::future::Future<Output = ()>,
) -> io::Result<()> {
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            res = listener.accept() => {
                let (stream, _) = res?;
                let state = state.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(stream, state, opts).await;
                });
            }
            _ = &mut shutdown => {
                return Ok(());
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<Mutex<State>>,
    opts: MockOptions,
) -> io::Result<()> {
    stream.set_nodelay(true)?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        let tokens: Vec<&str> = line.split(' ').collect();

        let reply: Vec<u8> = match tokens.as_slice() {
            ["GET", key] => {
                let value = state.lock().unwrap().strings.get(*key).cloned();
                match value {
                    Some(mut value) => {
                        if opts.corrupt_reads && !value.is_empty() {
                            value[0] ^= 0xff;
                        }
                        bulk(&value)
                    }
                    None => b"$-1\r\n".to_vec(),
                }
            }
            ["SET", key, len] => {
                let value = read_payload(&mut reader, len).await?;
                state.lock().unwrap().strings.insert((*key).to_string(), value);
                b"+OK\r\n".to_vec()
            }
            ["DEL", keys @ ..] => {
                let mut state = state.lock().unwrap();
                let mut removed = 0i64;
                for key in keys {
                    if state.strings.remove(*key).is_some() {
                        removed += 1;
                    }
                    if state.lists.remove(*key).is_some() {
                        removed += 1;
                    }
                    if state.hashes.remove(*key).is_some() {
                        removed += 1;
                    }
                }
                integer(removed)
            }
            ["LPUSH", key, len] => {
                let value = read_payload(&mut reader, len).await?;
                let mut state = state.lock().unwrap();
                let list = state.lists.entry((*key).to_string()).or_default();
                list.push_front(value);
                integer(list.len() as i64)
            }
            ["LPOP", key] => {
                let value = state
                    .lock()
                    .unwrap()
                    .lists
                    .get_mut(*key)
                    .and_then(|list| list.pop_front());
                match value {
                    Some(value) => bulk(&value),
                    None => b"$-1\r\n".to_vec(),
                }
            }
            ["HSET", key, field, len] => {
                let value = read_payload(&mut reader, len).await?;
                let mut state = state.lock().unwrap();
                let hash = state.hashes.entry((*key).to_string()).or_default();
                let created = hash.insert((*field).to_string(), value).is_none();
                integer(created as i64)
            }
            ["HGET", key, field] => {
                let value = state
                    .lock()
                    .unwrap()
                    .hashes
                    .get(*key)
                    .and_then(|hash| hash.get(*field).cloned());
                match value {
                    Some(value) => bulk(&value),
                    None => b"$-1\r\n".to_vec(),
                }
            }
            ["HGETALL", key] => {
                let pairs: Vec<(String, Vec<u8>)> = state
                    .lock()
                    .unwrap()
                    .hashes
                    .get(*key)
                    .map(|hash| hash.iter().map(|(f, v)| (f.clone(), v.clone())).collect())
                    .unwrap_or_default();
                let mut reply = format!("*{}\r\n", pairs.len() * 2).into_bytes();
                for (field, value) in pairs {
                    reply.extend_from_slice(&bulk(field.as_bytes()));
                    reply.extend_from_slice(&bulk(&value));
                }
                reply
            }
            ["DEBUG", "SWAPIN", _key] => b"+OK\r\n".to_vec(),
            ["INFO"] => {
                let state = state.lock().unwrap();
                let info = format!(
                    "# Keyspace\r\nstrings:{}\r\nlists:{}\r\nhashes:{}\r\n",
                    state.strings.len(),
                    state.lists.len(),
                    state.hashes.len()
                );
                bulk(info.as_bytes())
            }
            _ => format!("-ERR unknown command '{}'\r\n", line).into_bytes(),
        };

        if opts.chunked_replies {
            for piece in reply.chunks(3) {
                write_half.write_all(piece).await?;
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        } else {
            write_half.write_all(&reply).await?;
        }
    }
}

/// Read the raw payload bytes announced by the trailing length token,
/// plus the CRLF the command terminator left behind.
async fn read_payload<R>(reader: &mut BufReader<R>, len: &str) -> io::Result<Vec<u8>>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let len: usize = len
        .parse()
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad payload length"))?;
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    let mut crlf = [0u8; 2];
    reader.read_exact(&mut crlf).await?;
    Ok(payload)
}

fn bulk(value: &[u8]) -> Vec<u8> {
    let mut reply = format!("${}\r\n", value.len()).into_bytes();
    reply.extend_from_slice(value);
    reply.extend_from_slice(b"\r\n");
    reply
}

fn integer(value: i64) -> Vec<u8> {
    format!(":{}\r\n", value).into_bytes()
}
