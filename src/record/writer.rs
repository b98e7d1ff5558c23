use std::path::Path;

use crate::{
    encoding::Message,
    error::{Error, Result},
    record::{compress, RecordHeader, MAGIC},
    stream::{FileStream, RecordStream},
};

pub struct RecordWriter<S>
where
    S: RecordStream,
{
    stream: S,
    use_compression: bool,
    owns_stream: bool,
    closed: bool,
}

impl RecordWriter<FileStream> {
    // Creates the file at `path` and takes ownership of it, so dropping the
    // writer closes the file.
    pub fn create<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let mut writer = RecordWriter::new(FileStream::create(path)?);
        writer.set_owns_stream(true);
        Ok(writer)
    }
}

impl<S> RecordWriter<S>
where
    S: RecordStream,
{
    pub fn new(stream: S) -> Self {
        RecordWriter {
            stream,
            use_compression: false,
            owns_stream: false,
            closed: false,
        }
    }

    pub fn set_use_compression(&mut self, use_compression: bool) {
        self.use_compression = use_compression;
    }

    pub fn set_owns_stream(&mut self, owns_stream: bool) {
        self.owns_stream = owns_stream;
    }

    // Issues a single write and demands the full transfer. There are no
    // retries at this layer.
    fn put(&mut self, buf: &[u8]) -> Result<()> {
        let written = self.stream.write(buf)?;
        if written != buf.len() {
            return Err(Error::ShortWrite {
                written,
                expected: buf.len(),
            });
        }
        Ok(())
    }

    pub fn write_record(&mut self, record: &[u8]) -> Result<()> {
        self.put(&MAGIC.to_le_bytes())?;

        let compressed = if self.use_compression {
            compress(record)
        } else {
            None
        };

        // Write the header, length-prefixed.
        let header = RecordHeader {
            uncompressed_size: record.len() as u64,
            compressed_size: compressed.as_ref().map(|buf| buf.len() as u64),
        };
        let mut header_bytes = Vec::new();
        header.to_bytes(&mut header_bytes);
        self.put(&(header_bytes.len() as u32).to_le_bytes())?;
        self.put(&header_bytes)?;

        // Write the body.
        self.put(compressed.as_deref().unwrap_or(record))?;

        Ok(())
    }

    pub fn write_message<M>(&mut self, message: &M) -> Result<()>
    where
        M: Message,
    {
        let mut buf = Vec::new();
        message.to_bytes(&mut buf);
        self.write_record(&buf)
    }

    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream.close()?;
        Ok(())
    }
}

impl<S> Drop for RecordWriter<S>
where
    S: RecordStream,
{
    fn drop(&mut self) {
        if self.owns_stream && !self.closed {
            if let Err(err) = self.close() {
                log::warn!("closing owned stream failed: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{
        encoding::Message,
        error::Error,
        record::{writer::RecordWriter, RecordHeader, MAGIC},
        stream::{Event, MockStream},
    };

    #[test]
    fn test_frame_layout() {
        let stream = MockStream::new();
        let mut writer = RecordWriter::new(stream.clone());
        writer.write_record(b"RECORD 1").unwrap();

        let mut expected = Vec::new();
        expected.extend(MAGIC.to_le_bytes());
        expected.extend(9u32.to_le_bytes());
        expected.push(1);
        expected.extend(8u64.to_le_bytes());
        expected.extend(b"RECORD 1");
        assert_eq!(stream.data(), expected);
    }

    #[test]
    fn test_empty_record_layout() {
        let stream = MockStream::new();
        let mut writer = RecordWriter::new(stream.clone());
        writer.write_record(b"").unwrap();

        let data = stream.data();
        assert_eq!(data.len(), 17);
        assert_eq!(data[8], 1);
        assert_eq!(&data[9..], &0u64.to_le_bytes());
    }

    #[test]
    fn test_compressed_frame_marks_header() {
        let stream = MockStream::new();
        let mut writer = RecordWriter::new(stream.clone());
        writer.set_use_compression(true);
        writer.write_record(&[b'a'; 1000]).unwrap();

        let data = stream.data();
        let header_len = u32::from_le_bytes(data[4..8].try_into().unwrap()) as usize;
        let header = RecordHeader::from_bytes(&data[8..8 + header_len]).unwrap();
        assert_eq!(header.uncompressed_size, 1000);
        let disk_size = header.compressed_size.expect("run of a's should compress") as usize;
        assert!(disk_size < 1000);
        assert_eq!(data.len(), 8 + header_len + disk_size);
    }

    #[test]
    fn test_short_write() {
        let stream = MockStream::new();
        stream.short_write_next(2);
        let mut writer = RecordWriter::new(stream.clone());
        assert!(matches!(
            writer.write_record(b"RECORD 1"),
            Err(Error::ShortWrite {
                written: 2,
                expected: 4
            })
        ));
    }

    #[test]
    fn test_borrowed_stream() {
        let mut stream = MockStream::new();
        {
            let mut writer = RecordWriter::new(&mut stream);
            writer.write_record(b"RECORD 1").unwrap();
        }
        assert_eq!(stream.data().len(), 25);
    }

    #[test]
    fn test_owned_stream_closes_on_drop() {
        let stream = MockStream::new();
        {
            let mut writer = RecordWriter::new(stream.clone());
            writer.set_owns_stream(true);
            writer.write_record(b"RECORD 1").unwrap();
        }
        let closes = stream
            .take_events()
            .iter()
            .filter(|event| matches!(event, Event::Close))
            .count();
        assert_eq!(closes, 1);

        // A borrowed stream is left open.
        let stream = MockStream::new();
        RecordWriter::new(stream.clone())
            .write_record(b"RECORD 1")
            .unwrap();
        assert!(!stream
            .take_events()
            .iter()
            .any(|event| matches!(event, Event::Close)));
    }

    #[test]
    fn test_close_is_idempotent() {
        let stream = MockStream::new();
        let mut writer = RecordWriter::new(stream.clone());
        writer.set_owns_stream(true);
        writer.write_record(b"RECORD 1").unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
        drop(writer);

        let closes = stream
            .take_events()
            .iter()
            .filter(|event| matches!(event, Event::Close))
            .count();
        assert_eq!(closes, 1);
    }
}
