//! Async chat client speaking the fixed-frame protocol.

use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::Path;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::error::ClientError;
use crate::frame::{FRAME_LEN, Frame};

/// Resolves `host` and connects to the first address that accepts.
pub async fn connect(host: &str, port: u16) -> Result<(TcpStream, SocketAddr), ClientError> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
        .await
        .map_err(|_| ClientError::UnknownHost(host.to_string()))?
        .collect();

    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok((stream, addr)),
            Err(source) => last_err = Some(ClientError::Connect { addr, source }),
        }
    }
    Err(last_err.unwrap_or_else(|| ClientError::UnknownHost(host.to_string())))
}

pub fn split(stream: TcpStream) -> (FrameReader<OwnedReadHalf>, FrameWriter<OwnedWriteHalf>) {
    let (reader, writer) = stream.into_split();
    (FrameReader::new(reader), FrameWriter::new(writer))
}

pub struct FrameReader<R> {
    inner: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Next whole frame, or `None` when the server closed the connection.
    pub async fn next_frame(&mut self) -> std::io::Result<Option<Frame>> {
        let mut buf = [0u8; FRAME_LEN];
        match self.inner.read_exact(&mut buf).await {
            Ok(_) => Ok(Some(Frame::from_wire(buf))),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }
}

pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn send(&mut self, frame: &Frame) -> std::io::Result<()> {
        self.inner.write_all(frame.as_bytes()).await?;
        self.inner.flush().await
    }

    pub async fn send_text(&mut self, text: &str) -> std::io::Result<()> {
        self.send(&Frame::text(text)).await
    }

    /// Tells the server this client is leaving.
    pub async fn send_disconnect(&mut self) -> std::io::Result<()> {
        self.send(&Frame::disconnect()).await
    }
}

/// Everything sent and received during a session, saved on request.
#[derive(Debug, Default)]
pub struct Transcript {
    lines: Vec<String>,
}

impl Transcript {
    pub fn push(&mut self, line: impl Into<String>) {
        let mut line = line.into();
        if !line.ends_with('\n') {
            line.push('\n');
        }
        self.lines.push(line);
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Overwrites `path` with the transcript so far.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.lines.concat())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frames_cross_a_duplex_pipe() {
        let (left, right) = tokio::io::duplex(FRAME_LEN * 4);
        let mut writer = FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        writer.send_text("hello\n").await.unwrap();
        writer.send_disconnect().await.unwrap();
        drop(writer);

        let first = reader.next_frame().await.unwrap().unwrap();
        assert_eq!(first.payload(), b"hello\n");
        assert!(reader.next_frame().await.unwrap().unwrap().is_disconnect());
        assert!(reader.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_host_is_reported() {
        let err = connect("no-such-host.invalid", 7000).await.unwrap_err();
        assert!(matches!(err, ClientError::UnknownHost(_)));
    }

    #[test]
    fn test_transcript_saves_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("output.txt");

        let mut transcript = Transcript::default();
        transcript.push("hi\n");
        transcript.push("10.0.0.2:5000: hello");
        transcript.save(&path).unwrap();

        let saved = std::fs::read_to_string(&path).unwrap();
        assert_eq!(saved, "hi\n10.0.0.2:5000: hello\n");
        assert_eq!(transcript.len(), 2);
    }
}
