//! Bounded output capture
//!
//! Each stream is drained by its own task while the caller waits for the child,
//! so a chatty program can never block on a full pipe. Bytes beyond the limit
//! are read and dropped.

use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const CHUNK_SIZE: usize = 8192;

/// Bytes read from one stream
#[derive(Debug, Default)]
pub struct Captured {
    pub bytes: Vec<u8>,
    /// True if the stream produced more than the limit
    pub truncated: bool,
}

impl Captured {
    /// Decode as UTF-8 (lossy), noting truncation at the end
    pub fn into_text(self) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.truncated {
            if !text.ends_with('\n') && !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&format!("[output truncated after {} bytes]", self.bytes.len()));
        }
        text
    }
}

/// Background reader for one stream
pub struct StreamCapture {
    handle: JoinHandle<io::Result<Captured>>,
    stop: Option<oneshot::Sender<()>>,
}

impl StreamCapture {
    pub fn spawn<R>(reader: R, limit: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (stop, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(read_capped(reader, limit, stop_rx));
        Self {
            handle,
            stop: Some(stop),
        }
    }

    /// Wait for EOF. If the stream stays open past `grace` (a descendant still
    /// holds the pipe), stop reading and keep what was captured.
    pub async fn finish(mut self, grace: Duration) -> io::Result<Captured> {
        if let Ok(joined) = tokio::time::timeout(grace, &mut self.handle).await {
            return joined.map_err(io::Error::other)?;
        }
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        (&mut self.handle).await.map_err(io::Error::other)?
    }

    /// Discard the stream
    pub fn abort(self) {
        self.handle.abort();
    }
}

async fn read_capped<R>(
    mut reader: R,
    limit: usize,
    mut stop: oneshot::Receiver<()>,
) -> io::Result<Captured>
where
    R: AsyncRead + Unpin,
{
    let mut captured = Captured::default();
    let mut chunk = [0u8; CHUNK_SIZE];

    loop {
        let n = tokio::select! {
            read = reader.read(&mut chunk) => read?,
            _ = &mut stop => break,
        };
        if n == 0 {
            break;
        }

        let room = limit.saturating_sub(captured.bytes.len());
        if n > room {
            captured.truncated = true;
        }
        captured.bytes.extend_from_slice(&chunk[..n.min(room)]);
    }

    Ok(captured)
}

/// stdout and stderr readers for one child
pub struct Pipes {
    stdout: StreamCapture,
    stderr: StreamCapture,
}

impl Pipes {
    /// Take the child's piped stdout/stderr and start draining them
    pub fn capture(child: &mut Child, limit: usize) -> io::Result<Self> {
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("child stdout is not piped"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("child stderr is not piped"))?;

        Ok(Self {
            stdout: StreamCapture::spawn(stdout, limit),
            stderr: StreamCapture::spawn(stderr, limit),
        })
    }

    /// Collect both streams as text
    pub async fn finish(self, grace: Duration) -> io::Result<(String, String)> {
        let (stdout, stderr) = tokio::join!(
            self.stdout.finish(grace),
            self.stderr.finish(grace)
        );
        Ok((stdout?.into_text(), stderr?.into_text()))
    }

    pub fn abort(self) {
        self.stdout.abort();
        self.stderr.abort();
    }
}
