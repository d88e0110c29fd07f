/// sniff.rs — MIME detection from a bounded stream prefix.
/// The prefix is kept and replayed in front of the rest of the stream, so the
/// upload body carries every byte the sniffer looked at.
use std::io::Cursor;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::ReaderStream;

pub const SNIFF_LEN: usize = 512;
pub const DEFAULT_MIME: &str = "application/octet-stream";

pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;

pub struct SniffedContent {
    pub mime_type: &'static str,
    prefix:        Vec<u8>,
    rest:          BoxReader,
}

impl SniffedContent {
    pub fn prefix(&self) -> &[u8] {
        &self.prefix
    }

    /// Prefix followed by the unread remainder, as one reader.
    pub fn into_reader(self) -> impl AsyncRead + Send + Unpin {
        Cursor::new(self.prefix).chain(self.rest)
    }

    /// Streaming request body; nothing beyond the prefix is buffered.
    pub fn into_body(self) -> reqwest::Body {
        reqwest::Body::wrap_stream(ReaderStream::new(self.into_reader()))
    }
}

/// Read up to [`SNIFF_LEN`] bytes (fewer only at EOF) and detect the type.
pub async fn sniff_prefix(mut reader: BoxReader) -> std::io::Result<SniffedContent> {
    let mut prefix = vec![0u8; SNIFF_LEN];
    let mut filled = 0;
    while filled < SNIFF_LEN {
        let n = reader.read(&mut prefix[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    prefix.truncate(filled);

    Ok(SniffedContent {
        mime_type: detect_mime(&prefix),
        prefix,
        rest: reader,
    })
}

pub fn detect_mime(prefix: &[u8]) -> &'static str {
    image::guess_format(prefix)
        .map(|f| f.to_mime_type())
        .unwrap_or(DEFAULT_MIME)
}
