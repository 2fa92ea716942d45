use std::io::{self, SeekFrom};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

use crate::{Resource, DEFAULT_CHUNK_LEN};

const OCTET_STREAM: &str = "application/octet-stream";

/// Implements [`Resource`] for any [`AsyncRead`] + [`AsyncSeek`] body with a
/// fixed byte size.
pub struct KnownSize<B> {
    byte_size: u64,
    chunk_len: u64,
    mime: String,
    last_modified: Option<SystemTime>,
    entity_tag: Option<String>,
    body: B,
}

impl<B> std::fmt::Debug for KnownSize<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnownSize")
            .field("byte_size", &self.byte_size)
            .field("chunk_len", &self.chunk_len)
            .field("mime", &self.mime)
            .finish()
    }
}

impl KnownSize<tokio::fs::File> {
    /// Opens `path`, taking size and modification time from its metadata and
    /// guessing the mime type from the extension.
    pub async fn file(path: impl AsRef<Path>) -> io::Result<KnownSize<tokio::fs::File>> {
        KnownSize::file_chunks(path, DEFAULT_CHUNK_LEN).await
    }

    /// Like [`KnownSize::file`], reading at most `chunk_len` bytes at a time.
    pub async fn file_chunks(path: impl AsRef<Path>, chunk_len: u64) -> io::Result<KnownSize<tokio::fs::File>> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await?;
        let metadata = file.metadata().await?;

        let byte_size = metadata.len();
        let last_modified = metadata.modified().ok();
        let entity_tag = last_modified.map(|modified| file_entity_tag(modified, byte_size));
        let mime = mime_guess::from_path(path).first_or_octet_stream().to_string();

        Ok(KnownSize {
            byte_size,
            chunk_len: chunk_len.max(1),
            mime,
            last_modified,
            entity_tag,
            body: file,
        })
    }
}

impl<B: AsyncRead + AsyncSeek + Unpin + Send> KnownSize<B> {
    /// Construct a [`KnownSize`] instance with a byte size supplied manually.
    pub fn sized(body: B, byte_size: u64) -> Self {
        KnownSize {
            byte_size,
            chunk_len: DEFAULT_CHUNK_LEN,
            mime: OCTET_STREAM.to_string(),
            last_modified: None,
            entity_tag: None,
            body,
        }
    }

    /// Uses `seek` to determine size by seeking to the end and getting stream position.
    pub async fn seek(mut body: B) -> io::Result<KnownSize<B>> {
        let byte_size = body.seek(SeekFrom::End(0)).await?;
        Ok(KnownSize::sized(body, byte_size))
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = mime.into();
        self
    }

    pub fn with_last_modified(mut self, last_modified: SystemTime) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    pub fn with_entity_tag(mut self, entity_tag: impl Into<String>) -> Self {
        self.entity_tag = Some(entity_tag.into());
        self
    }

    pub fn with_chunk_len(mut self, chunk_len: u64) -> Self {
        self.chunk_len = chunk_len.max(1);
        self
    }

    pub fn into_inner(self) -> B {
        self.body
    }
}

#[async_trait]
impl<B: AsyncRead + AsyncSeek + Unpin + Send> Resource for KnownSize<B> {
    fn byte_size(&self) -> u64 {
        self.byte_size
    }

    fn mime(&self) -> &str {
        &self.mime
    }

    fn last_modified(&self) -> Option<SystemTime> {
        self.last_modified
    }

    fn entity_tag(&self) -> Option<&str> {
        self.entity_tag.as_deref()
    }

    fn chunk_len(&self) -> u64 {
        self.chunk_len
    }

    async fn read_bytes(&mut self, offset: u64, length: u64) -> io::Result<Option<Bytes>> {
        if offset >= self.byte_size || length == 0 {
            return Ok(None);
        }
        let want = length.min(self.byte_size - offset);

        self.body.seek(SeekFrom::Start(offset)).await?;

        let capacity = usize::try_from(want.min(DEFAULT_CHUNK_LEN)).unwrap_or(0);
        let mut buffer = Vec::with_capacity(capacity);
        (&mut self.body).take(want).read_to_end(&mut buffer).await?;

        if buffer.is_empty() {
            Ok(None)
        } else {
            Ok(Some(Bytes::from(buffer)))
        }
    }
}

/// Weak validator in the usual `mtime-size` shape.
fn file_entity_tag(modified: SystemTime, byte_size: u64) -> String {
    let secs = modified.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    format!("\"{secs:x}-{byte_size:x}\"")
}

/// In-memory [`Resource`] over a [`Bytes`] buffer.
#[derive(Debug, Clone)]
pub struct MemoryResource {
    data: Bytes,
    mime: String,
    last_modified: Option<SystemTime>,
    entity_tag: Option<String>,
    chunk_len: u64,
}

impl MemoryResource {
    pub fn new(data: impl Into<Bytes>) -> Self {
        MemoryResource {
            data: data.into(),
            mime: OCTET_STREAM.to_string(),
            last_modified: None,
            entity_tag: None,
            chunk_len: DEFAULT_CHUNK_LEN,
        }
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = mime.into();
        self
    }

    pub fn with_last_modified(mut self, last_modified: SystemTime) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    pub fn with_entity_tag(mut self, entity_tag: impl Into<String>) -> Self {
        self.entity_tag = Some(entity_tag.into());
        self
    }

    pub fn with_chunk_len(mut self, chunk_len: u64) -> Self {
        self.chunk_len = chunk_len.max(1);
        self
    }
}

#[async_trait]
impl Resource for MemoryResource {
    fn byte_size(&self) -> u64 {
        self.data.len() as u64
    }

    fn mime(&self) -> &str {
        &self.mime
    }

    fn last_modified(&self) -> Option<SystemTime> {
        self.last_modified
    }

    fn entity_tag(&self) -> Option<&str> {
        self.entity_tag.as_deref()
    }

    fn chunk_len(&self) -> u64 {
        self.chunk_len
    }

    async fn read_bytes(&mut self, offset: u64, length: u64) -> io::Result<Option<Bytes>> {
        let size = self.byte_size();
        if offset >= size || length == 0 {
            return Ok(None);
        }
        let end = offset.saturating_add(length).min(size);
        // both bounds fit in usize, they are at most `data.len()`
        Ok(Some(self.data.slice(offset as usize..end as usize)))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use crate::Resource;

    use super::{KnownSize, MemoryResource};

    #[tokio::test]
    async fn test_file_size() {
        let known_size = KnownSize::file("test/fixture.txt").await.unwrap();
        assert_eq!(54, known_size.byte_size());
        assert_eq!("text/plain", known_size.mime());
        assert!(known_size.last_modified().is_some());

        let tag = known_size.entity_tag().unwrap();
        assert!(tag.starts_with('"') && tag.ends_with("-36\""), "unexpected tag {tag}");
    }

    #[tokio::test]
    async fn test_seek_size() {
        let body = Cursor::new(b"0123456789".to_vec());
        let known_size = KnownSize::seek(body).await.unwrap();
        assert_eq!(10, known_size.byte_size());
        assert_eq!("application/octet-stream", known_size.mime());
    }

    #[tokio::test]
    async fn test_file_read_bytes() {
        let mut known_size = KnownSize::file("test/fixture.txt").await.unwrap();

        let bytes = known_size.read_bytes(0, 11).await.unwrap().unwrap();
        assert_eq!(&b"Hello world"[..], &bytes[..]);

        let bytes = known_size.read_bytes(40, 100).await.unwrap().unwrap();
        assert_eq!(&b" requests on!\n"[..], &bytes[..]);

        assert_eq!(None, known_size.read_bytes(54, 1).await.unwrap());
        assert_eq!(None, known_size.read_bytes(3, 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_read_bytes() {
        let mut resource = MemoryResource::new("one two three four").with_mime("text/plain");
        assert_eq!(18, resource.byte_size());

        let bytes = resource.read_bytes(8, 5).await.unwrap().unwrap();
        assert_eq!(&b"three"[..], &bytes[..]);

        let bytes = resource.read_bytes(14, 50).await.unwrap().unwrap();
        assert_eq!(&b"four"[..], &bytes[..]);

        assert_eq!(None, resource.read_bytes(18, 1).await.unwrap());
    }
}
