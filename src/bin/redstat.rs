use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use redload::error::ClientError;
use redload::protocol::{read_reply, Reply, Request};

/// Periodically fetch and print server statistics.
#[derive(Parser, Debug)]
#[command(name = "redstat", version, about)]
struct Cli {
    /// Server hostname
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(long, default_value_t = 6379)]
    port: u16,

    /// Seconds between polls
    #[arg(long, default_value_t = 1)]
    delay: u64,
}

async fn poll(cli: &Cli) -> Result<(), ClientError> {
    let stream = TcpStream::connect((cli.host.as_str(), cli.port)).await?;
    stream.set_nodelay(true)?;
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    loop {
        write_half.write_all(&Request::new("INFO").finish()).await?;
        match read_reply(&mut reader).await? {
            Reply::Bulk(info) => println!("{}", String::from_utf8_lossy(&info)),
            Reply::Error(msg) => return Err(ClientError::Server(msg)),
            other => {
                return Err(ClientError::Protocol(format!(
                    "unexpected INFO reply: {:?}",
                    other
                )))
            }
        }
        tokio::time::sleep(Duration::from_secs(cli.delay)).await;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(err) = poll(&cli).await {
        eprintln!("redstat: {}", err);
        std::process::exit(1);
    }
}
