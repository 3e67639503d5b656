//! Bounded capture of process output streams

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::types::{ExecutionResult, meta};

const CHUNK_SIZE: usize = 8 * 1024;

/// Bytes captured from one output stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Captured {
    /// Kept bytes, at most the configured limit
    pub bytes: Vec<u8>,

    /// Whether the stream produced more than was kept
    pub truncated: bool,
}

impl Captured {
    /// Decode as text, replacing invalid UTF-8
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

impl From<&str> for Captured {
    fn from(text: &str) -> Self {
        Self {
            bytes: text.as_bytes().to_vec(),
            truncated: false,
        }
    }
}

/// Read `reader` to EOF, keeping at most `limit` bytes
///
/// The remainder is drained and discarded so the writer never blocks on a
/// full pipe.
pub async fn read_capped<R>(reader: R, limit: usize) -> std::io::Result<Captured>
where
    R: AsyncRead + Unpin,
{
    let mut captured = Captured::default();
    read_capped_into(reader, limit, &mut captured).await?;
    Ok(captured)
}

/// Like [`read_capped`], appending to `captured` as bytes arrive
///
/// Cancel safe: whatever was read before the future is dropped stays in
/// `captured`.
pub async fn read_capped_into<R>(
    mut reader: R,
    limit: usize,
    captured: &mut Captured,
) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; CHUNK_SIZE];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        let room = limit.saturating_sub(captured.bytes.len());
        if n > room {
            captured.truncated = true;
        }
        captured.bytes.extend_from_slice(&chunk[..n.min(room)]);
    }
}

/// Flag truncated streams on a result
pub(crate) fn mark_truncated(
    mut result: ExecutionResult,
    stdout: &Captured,
    stderr: &Captured,
) -> ExecutionResult {
    if stdout.truncated {
        result = result.with_meta(meta::STDOUT_TRUNCATED, true);
    }
    if stderr.truncated {
        result = result.with_meta(meta::STDERR_TRUNCATED, true);
    }
    result
}
