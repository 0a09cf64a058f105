//! Wire protocol codec.
//!
//! Requests are ASCII tokens separated by single spaces and terminated
//! by CRLF; a binary-safe payload argument is preceded by its decimal
//! length on its own line and is never escaped. Replies use one
//! leading type byte: `-` error, `+` status, `:` integer, `$` bulk,
//! `*` array. Two decoders share the grammar: [`read_reply`] pulls one
//! whole reply from a buffered stream, [`ReplyDecoder`] makes progress
//! on whatever bytes have arrived so far.

use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

use crate::error::ClientError;

/// A decoded server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Error(String),
    Status(String),
    Integer(i64),
    Bulk(Vec<u8>),
    /// Null bulk (`$-1`) or null array (`*-1`).
    Nil,
    Array(Vec<Reply>),
}

/// Builder for the exact request bytes.
///
/// ```
/// use redload::protocol::Request;
/// let wire = Request::new("SET").arg("string:7").blob(b"abc").finish();
/// assert_eq!(wire, b"SET string:7 3\r\nabc\r\n");
/// ```
pub struct Request {
    buf: Vec<u8>,
}

impl Request {
    pub fn new(cmd: &str) -> Self {
        Request { buf: cmd.as_bytes().to_vec() }
    }

    pub fn arg(mut self, token: &str) -> Self {
        self.buf.push(b' ');
        self.buf.extend_from_slice(token.as_bytes());
        self
    }

    /// Append a binary-safe payload: decimal length, CRLF, raw bytes.
    /// The command-final CRLF from [`finish`](Self::finish) terminates
    /// it, so a blob must be the last argument.
    pub fn blob(mut self, data: &[u8]) -> Self {
        self.buf.push(b' ');
        self.buf.extend_from_slice(data.len().to_string().as_bytes());
        self.buf.extend_from_slice(b"\r\n");
        self.buf.extend_from_slice(data);
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.buf.extend_from_slice(b"\r\n");
        self.buf
    }
}

/// Which CRLF-terminated line the decoder is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Error,
    Status,
    Integer,
    BulkLen,
    ArrayLen,
}

#[derive(Debug, Clone, Copy)]
enum DecodeState {
    /// Waiting for the leading type byte of a reply or array element.
    TypeByte,
    Line(LineKind),
    /// Waiting for `len` payload bytes plus the trailing CRLF.
    BulkBody { len: usize },
}

/// An array reply being assembled.
struct ArrayFrame {
    remaining: usize,
    elements: Vec<Reply>,
}

/// Incremental reply decoder.
///
/// Feed it whatever the socket delivered, then call
/// [`try_decode`](Self::try_decode) until it returns `None`. State
/// persists across calls, so a reply may be reassembled from
/// arbitrarily many partial reads. Unconsumed bytes stay buffered.
pub struct ReplyDecoder {
    buf: Vec<u8>,
    state: DecodeState,
    stack: Vec<ArrayFrame>,
}

impl Default for ReplyDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplyDecoder {
    pub fn new() -> Self {
        ReplyDecoder {
            buf: Vec::new(),
            state: DecodeState::TypeByte,
            stack: Vec::new(),
        }
    }

    /// Append newly received bytes.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Drop decode progress and buffered input. Used when a connection
    /// is recycled for a fresh request.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.state = DecodeState::TypeByte;
        self.stack.clear();
    }

    /// Try to make progress with the buffered bytes. Returns a
    /// complete reply, or `None` when more input is needed.
    pub fn try_decode(&mut self) -> Result<Option<Reply>, ClientError> {
        loop {
            let state = self.state;
            let completed = match state {
                DecodeState::TypeByte => {
                    if self.buf.is_empty() {
                        return Ok(None);
                    }
                    let type_byte = self.buf[0];
                    self.buf.drain(..1);
                    self.state = DecodeState::Line(match type_byte {
                        b'-' => LineKind::Error,
                        b'+' => LineKind::Status,
                        b':' => LineKind::Integer,
                        b'$' => LineKind::BulkLen,
                        b'*' => LineKind::ArrayLen,
                        other => {
                            return Err(ClientError::Protocol(format!(
                                "unexpected reply type byte {:?}",
                                other as char
                            )))
                        }
                    });
                    continue;
                }
                DecodeState::Line(kind) => {
                    let Some(line) = self.take_line() else {
                        return Ok(None);
                    };
                    match kind {
                        LineKind::Error => Some(Reply::Error(line)),
                        LineKind::Status => Some(Reply::Status(line)),
                        LineKind::Integer => Some(Reply::Integer(parse_int(&line)?)),
                        LineKind::BulkLen => match parse_int(&line)? {
                            -1 => Some(Reply::Nil),
                            len if len >= 0 => {
                                self.state = DecodeState::BulkBody { len: len as usize };
                                continue;
                            }
                            len => {
                                return Err(ClientError::Protocol(format!(
                                    "invalid bulk length {}",
                                    len
                                )))
                            }
                        },
                        LineKind::ArrayLen => match parse_int(&line)? {
                            -1 => Some(Reply::Nil),
                            0 => Some(Reply::Array(Vec::new())),
                            count if count > 0 => {
                                self.stack.push(ArrayFrame {
                                    remaining: count as usize,
                                    elements: Vec::with_capacity(count as usize),
                                });
                                self.state = DecodeState::TypeByte;
                                continue;
                            }
                            count => {
                                return Err(ClientError::Protocol(format!(
                                    "invalid array count {}",
                                    count
                                )))
                            }
                        },
                    }
                }
                DecodeState::BulkBody { len } => {
                    // Payload plus its trailing CRLF must be buffered
                    // in full before we consume anything.
                    if self.buf.len() < len + 2 {
                        return Ok(None);
                    }
                    let payload = self.buf[..len].to_vec();
                    self.buf.drain(..len + 2);
                    Some(Reply::Bulk(payload))
                }
            };

            self.state = DecodeState::TypeByte;
            if let Some(reply) = completed {
                if let Some(full) = self.resolve(reply) {
                    return Ok(Some(full));
                }
            }
        }
    }

    /// Fold a finished sub-reply into the enclosing array frames.
    /// Returns the top-level reply once nothing encloses it.
    fn resolve(&mut self, mut reply: Reply) -> Option<Reply> {
        loop {
            match self.stack.last_mut() {
                None => return Some(reply),
                Some(frame) => {
                    frame.elements.push(reply);
                    frame.remaining -= 1;
                    if frame.remaining > 0 {
                        return None;
                    }
                }
            }
            let frame = self.stack.pop()?;
            reply = Reply::Array(frame.elements);
        }
    }

    /// Consume one CRLF-terminated line, trimming the terminator.
    fn take_line(&mut self) -> Option<String> {
        let nl = self.buf.iter().position(|&b| b == b'\n')?;
        let mut line = &self.buf[..nl];
        if line.last() == Some(&b'\r') {
            line = &line[..line.len() - 1];
        }
        let line = String::from_utf8_lossy(line).into_owned();
        self.buf.drain(..nl + 1);
        Some(line)
    }
}

fn parse_int(line: &str) -> Result<i64, ClientError> {
    line.trim()
        .parse::<i64>()
        .map_err(|_| ClientError::Protocol(format!("invalid integer line {:?}", line)))
}

/// Read exactly one whole reply from a buffered stream.
///
/// This is the blocking-style form used by the stats poller: it
/// suspends until every byte of the reply has arrived. Array elements
/// are decoded recursively.
pub async fn read_reply<R>(reader: &mut BufReader<R>) -> Result<Reply, ClientError>
where
    R: AsyncRead + Unpin,
{
    read_reply_boxed(reader).await
}

fn read_reply_boxed<'a, R>(
    reader: &'a mut BufReader<R>,
) -> Pin<Box<dyn Future<Output = Result<Reply, ClientError>> + 'a>>
where
    R: AsyncRead + Unpin,
{
    Box::pin(async move {
        let mut type_byte = [0u8; 1];
        reader.read_exact(&mut type_byte).await?;
        match type_byte[0] {
            b'-' => Ok(Reply::Error(read_line(reader).await?)),
            b'+' => Ok(Reply::Status(read_line(reader).await?)),
            b':' => Ok(Reply::Integer(parse_int(&read_line(reader).await?)?)),
            b'$' => match parse_int(&read_line(reader).await?)? {
                -1 => Ok(Reply::Nil),
                len if len >= 0 => {
                    let mut payload = vec![0u8; len as usize];
                    reader.read_exact(&mut payload).await?;
                    let mut crlf = [0u8; 2];
                    reader.read_exact(&mut crlf).await?;
                    Ok(Reply::Bulk(payload))
                }
                len => Err(ClientError::Protocol(format!("invalid bulk length {}", len))),
            },
            b'*' => match parse_int(&read_line(reader).await?)? {
                -1 => Ok(Reply::Nil),
                count if count >= 0 => {
                    let mut elements = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        elements.push(read_reply_boxed(reader).await?);
                    }
                    Ok(Reply::Array(elements))
                }
                count => Err(ClientError::Protocol(format!("invalid array count {}", count))),
            },
            other => Err(ClientError::Protocol(format!(
                "unexpected reply type byte {:?}",
                other as char
            ))),
        }
    })
}

async fn read_line<R>(reader: &mut BufReader<R>) -> Result<String, ClientError>
where
    R: AsyncRead + Unpin,
{
    let mut line = String::new();
    let read = reader.read_line(&mut line).await?;
    if read == 0 {
        return Err(ClientError::Protocol("connection closed mid-reply".into()));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
