use std::path::Path;

use crate::{
    encoding::Message,
    error::{Error, Result},
    record::{decompress, RecordHeader, MAGIC, MAX_HEADER_LEN},
    stream::{FileStream, RecordStream},
};

pub struct RecordReader<S>
where
    S: RecordStream,
{
    stream: S,
    owns_stream: bool,
    closed: bool,
    done: bool,
}

impl RecordReader<FileStream> {
    // Opens the file at `path` and takes ownership of it, so dropping the
    // reader closes the file.
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let mut reader = RecordReader::new(FileStream::open(path)?);
        reader.set_owns_stream(true);
        Ok(reader)
    }
}

impl<S> RecordReader<S>
where
    S: RecordStream,
{
    pub fn new(stream: S) -> Self {
        RecordReader {
            stream,
            owns_stream: false,
            closed: false,
            done: false,
        }
    }

    pub fn set_owns_stream(&mut self, owns_stream: bool) {
        self.owns_stream = owns_stream;
    }

    // Issues a single read and demands the full transfer. There are no
    // retries at this layer.
    fn fill(&mut self, buf: &mut [u8], what: &'static str) -> Result<()> {
        let got = self.stream.read(buf)?;
        if got != buf.len() {
            log::error!("truncated {}: read {} of {} bytes", what, got, buf.len());
            return Err(Error::Truncated {
                what,
                got,
                want: buf.len(),
            });
        }
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<Vec<u8>>> {
        let mut magic = [0; 4];
        let n = self.stream.read(&mut magic)?;
        if n < magic.len() {
            // The clean end of the stream. Trailing garbage shorter than the
            // magic number is indistinguishable from it and is also treated
            // as the end.
            return Ok(None);
        }
        let found = u32::from_le_bytes(magic);
        if found != MAGIC {
            log::error!("bad magic number 0x{:08x} in record stream", found);
            return Err(Error::BadMagic { found });
        }

        let mut header_len = [0; 4];
        self.fill(&mut header_len, "header length")?;
        let header_len = u32::from_le_bytes(header_len) as usize;
        if header_len > MAX_HEADER_LEN {
            let err = anyhow::anyhow!(
                "header length {} exceeds limit {}",
                header_len,
                MAX_HEADER_LEN
            );
            log::error!("implausible record header: {}", err);
            return Err(Error::Header(err));
        }

        let mut header_bytes = vec![0; header_len];
        self.fill(&mut header_bytes, "header")?;
        let header = RecordHeader::from_bytes(&header_bytes).map_err(|err| {
            log::error!("malformed record header: {}", err);
            Error::Header(err)
        })?;

        let mut body = vec![0; header.disk_size() as usize];
        self.fill(&mut body, "record body")?;

        if header.is_compressed() {
            match decompress(&body, header.uncompressed_size) {
                Ok(record) => Ok(Some(record)),
                Err(err) => {
                    log::error!("record body failed to decompress: {}", err);
                    Err(err)
                }
            }
        } else {
            Ok(Some(body))
        }
    }

    // Reads the next record, or None once the stream is exhausted. A reader
    // that has reported the end, or any failure, stays exhausted: there is no
    // resynchronizing to a later frame once a read goes wrong.
    pub fn read_record(&mut self) -> Result<Option<Vec<u8>>> {
        if self.done {
            return Ok(None);
        }
        let result = self.read_frame();
        if !matches!(result, Ok(Some(_))) {
            self.done = true;
        }
        result
    }

    pub fn read_message<M>(&mut self) -> Result<Option<M>>
    where
        M: Message,
    {
        match self.read_record()? {
            // A parse failure does not exhaust the reader. The frame itself
            // was sound, so the next one is still readable.
            Some(record) => match M::from_bytes(&record) {
                Ok(message) => Ok(Some(message)),
                Err(err) => Err(Error::Message(err)),
            },
            None => Ok(None),
        }
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

impl<S> Iterator for RecordReader<S>
where
    S: RecordStream,
{
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_record().transpose()
    }
}

impl<S> Drop for RecordReader<S>
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
