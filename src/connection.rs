use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::ClientError;
use crate::protocol::{Reply, ReplyDecoder};

/// One logical session to the server, pipelining at depth 1: a new
/// request is never written before the previous reply has been fully
/// decoded.
pub struct Connection {
    stream: TcpStream,
    decoder: ReplyDecoder,
}

impl Connection {
    /// Connect with no-delay enabled. Latency buckets are one
    /// millisecond wide, so Nagle batching would swamp the signal.
    pub async fn open(addr: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Connection { stream, decoder: ReplyDecoder::new() })
    }

    /// Flush one encoded request and reassemble its reply, however
    /// many partial reads that takes.
    pub async fn exchange(&mut self, wire: &[u8]) -> Result<Reply, ClientError> {
        self.stream.write_all(wire).await?;

        let mut chunk = [0u8; 4096];
        loop {
            if let Some(reply) = self.decoder.try_decode()? {
                return Ok(reply);
            }
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(ClientError::Protocol(
                    "server closed the connection mid-reply".into(),
                ));
            }
            self.decoder.feed(&chunk[..n]);
        }
    }

    /// Prepare the connection for reuse by the next request.
    pub fn recycle(&mut self) {
        self.decoder.reset();
    }
}
