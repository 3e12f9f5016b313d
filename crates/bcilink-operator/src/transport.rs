//! Async telnet transport for the BCI2000 operator

use anyhow::Result;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Prompt the operator prints when it is ready for the next command
pub const PROMPT: u8 = b'>';

/// Characters stripped from every response
const TRIM_CHARS: &[char] = &['\r', '\n', ' ', '>'];

/// Line-based telnet connection to a running operator
pub struct TelnetTransport {
    stream: TcpStream,
    target: SocketAddr,
    timeout_ms: u64,
}

impl TelnetTransport {
    /// Connect to an operator listening on `target`
    pub async fn connect(target: SocketAddr, timeout_ms: u64) -> Result<Self> {
        let duration = Duration::from_millis(timeout_ms);
        let stream = timeout(duration, TcpStream::connect(target)).await??;
        stream.set_nodelay(true)?;
        debug!(target = %target, "Telnet connection established");

        Ok(Self {
            stream,
            target,
            timeout_ms,
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Wait for the initial prompt after connecting
    pub async fn read_banner(&mut self) -> Result<String> {
        self.read_until_prompt(self.timeout_ms).await
    }

    /// Send one command line without waiting for a response
    pub async fn send(&mut self, command: &str) -> Result<()> {
        trace!(target = %self.target, command = %command, "Sending operator command");
        let mut line = Vec::with_capacity(command.len() + 2);
        line.extend_from_slice(command.as_bytes());
        line.extend_from_slice(b"\r\n");
        self.stream.write_all(&line).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Send one command line and return the operator's response
    pub async fn transceive(&mut self, command: &str) -> Result<String> {
        let timeout_ms = self.timeout_ms;
        self.transceive_within(command, timeout_ms).await
    }

    /// Like `transceive`, with a per-call timeout for slow commands
    pub async fn transceive_within(&mut self, command: &str, timeout_ms: u64) -> Result<String> {
        self.send(command).await?;
        let response = self.read_until_prompt(timeout_ms).await?;
        trace!(command = %command, response = %response, "Received operator response");
        Ok(response)
    }

    async fn read_until_prompt(&mut self, timeout_ms: u64) -> Result<String> {
        let duration = Duration::from_millis(timeout_ms);
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];

        loop {
            let len = timeout(duration, self.stream.read(&mut chunk)).await??;
            if len == 0 {
                anyhow::bail!("Operator closed the connection");
            }
            buf.extend_from_slice(&chunk[..len]);
            if ends_with_prompt(&buf) {
                break;
            }
        }

        Ok(clean_response(&String::from_utf8_lossy(&buf)))
    }
}

/// Whether `buf` ends with a prompt on its own line
fn ends_with_prompt(buf: &[u8]) -> bool {
    let end = buf
        .iter()
        .rposition(|b| *b != b' ')
        .map(|i| i + 1)
        .unwrap_or(0);
    let trimmed = &buf[..end];
    match trimmed {
        [PROMPT] => true,
        [.., b'\n', PROMPT] => true,
        _ => false,
    }
}

/// Strip the prompt and surrounding line breaks from a raw response
pub fn clean_response(raw: &str) -> String {
    raw.trim_matches(TRIM_CHARS).to_string()
}
