//! Fixed-size chunk reader over any byte source.
//!
//! The transmission loop needs to know whether the chunk it just admitted was
//! the last one, so [`ChunkSource`] keeps one chunk of look-ahead.  An empty
//! read marks the end of the source.
//!
//! Chunks are read inline on the async task.  A reader that can stall (a pipe,
//! a terminal) should first be drained with [`buffer_blocking`].

use std::io::{self, Cursor, Read};

/// Read `reader` to the end on tokio's blocking pool and return the bytes as
/// an in-memory reader that never blocks.
pub async fn buffer_blocking<R>(mut reader: R) -> io::Result<Cursor<Vec<u8>>>
where
    R: Read + Send + 'static,
{
    let bytes = tokio::task::spawn_blocking(move || {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).map(|_| bytes)
    })
    .await
    .map_err(io::Error::other)??;
    Ok(Cursor::new(bytes))
}

#[derive(Debug)]
pub struct ChunkSource<R> {
    reader: R,
    chunk_size: usize,
    lookahead: Option<Vec<u8>>,
    exhausted: bool,
}

impl<R: Read> ChunkSource<R> {
    pub fn new(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size,
            lookahead: None,
            exhausted: false,
        }
    }

    /// The next chunk without consuming it, or `None` at end of source.
    pub fn peek(&mut self) -> io::Result<Option<&[u8]>> {
        if self.lookahead.is_none() && !self.exhausted {
            let chunk = self.read_chunk()?;
            if chunk.is_empty() {
                self.exhausted = true;
            } else {
                self.lookahead = Some(chunk);
            }
        }
        Ok(self.lookahead.as_deref())
    }

    /// Consume the next chunk, or `None` at end of source.
    pub fn take(&mut self) -> io::Result<Option<Vec<u8>>> {
        self.peek()?;
        Ok(self.lookahead.take())
    }

    /// `true` once every chunk has been taken.
    pub fn is_exhausted(&mut self) -> io::Result<bool> {
        Ok(self.peek()?.is_none())
    }

    /// Read up to `chunk_size` bytes, retrying short reads until the chunk is
    /// full or the reader reports end of input.
    fn read_chunk(&mut self) -> io::Result<Vec<u8>> {
        let mut chunk = vec![0u8; self.chunk_size];
        let mut filled = 0;
        while filled < chunk.len() {
            match self.reader.read(&mut chunk[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        chunk.truncate(filled);
        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Reader that hands out at most `step` bytes per call.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.step).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn splits_into_fixed_chunks() {
        let data = vec![7u8; 1200];
        let mut src = ChunkSource::new(&data[..], 500);
        let sizes: Vec<usize> = std::iter::from_fn(|| src.take().unwrap())
            .map(|c| c.len())
            .collect();
        assert_eq!(sizes, vec![500, 500, 200]);
        assert!(src.is_exhausted().unwrap());
    }

    #[test]
    fn short_reads_are_coalesced() {
        let data: Vec<u8> = (0..10).collect();
        let mut src = ChunkSource::new(Trickle { data: &data, step: 3 }, 4);
        assert_eq!(src.take().unwrap().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(src.take().unwrap().unwrap(), vec![4, 5, 6, 7]);
        assert_eq!(src.take().unwrap().unwrap(), vec![8, 9]);
        assert_eq!(src.take().unwrap(), None);
    }

    #[test]
    fn peek_does_not_consume() {
        let mut src = ChunkSource::new(&b"abc"[..], 2);
        assert_eq!(src.peek().unwrap(), Some(&b"ab"[..]));
        assert_eq!(src.take().unwrap().unwrap(), b"ab");
        assert!(!src.is_exhausted().unwrap());
        assert_eq!(src.take().unwrap().unwrap(), b"c");
        assert!(src.is_exhausted().unwrap());
    }

    #[test]
    fn empty_source_is_exhausted_immediately() {
        let mut src = ChunkSource::new(io::empty(), 500);
        assert!(src.is_exhausted().unwrap());
        assert_eq!(src.take().unwrap(), None);
    }

    /// Reader whose every read fails.
    struct Broken;

    impl Read for Broken {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
        }
    }

    #[tokio::test]
    async fn buffered_source_yields_same_chunks() {
        const DATA: &[u8] = &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9];
        let buffered = buffer_blocking(Trickle { data: DATA, step: 3 }).await.unwrap();
        let mut src = ChunkSource::new(buffered, 4);
        assert_eq!(src.take().unwrap().unwrap(), vec![0, 1, 2, 3]);
        assert_eq!(src.take().unwrap().unwrap(), vec![4, 5, 6, 7]);
        assert_eq!(src.take().unwrap().unwrap(), vec![8, 9]);
        assert!(src.is_exhausted().unwrap());
    }

    #[tokio::test]
    async fn buffering_reports_read_errors() {
        let err = buffer_blocking(Broken).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }
}
