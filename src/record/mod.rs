pub mod reader;
pub mod writer;

// This package provides facilities to write and read logs of framed records.
//
// A record log is a flat sequence of frames. Each frame is self-describing:
// given the offset where one frame ends, the next frame can be decoded with
// no other state. There is no index and no footer; end-of-file is the only
// terminator.
//
// Physically, a frame is laid out as:
//
//   magic number     4 bytes, little-endian, always 0x4e731039
//   header length    4 bytes, little-endian
//   header           a sequence of (tag, u64) fields; tag 1 is the record's
//                    true length, tag 2, if present, is its compressed length
//   body             compressed-length bytes when the header carries tag 2,
//                    true-length bytes otherwise
//
// Compression is per-record zlib. A record whose compression attempt fails
// is stored uncompressed; the presence of tag 2 is the only thing that marks
// a body as compressed, so readers never guess.

use std::io::{Read, Write};

use anyhow::bail;
use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};

use crate::{
    encoding::{FieldReader, FieldWriter, Message},
    error::{Error, Result},
};

pub const MAGIC: u32 = 0x4e731039;

// The header schema needs 18 bytes today. Reads reject anything claiming
// more than this before allocating for it.
pub(crate) const MAX_HEADER_LEN: usize = 1024;

const TAG_UNCOMPRESSED_SIZE: u8 = 1;
const TAG_COMPRESSED_SIZE: u8 = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordHeader {
    pub uncompressed_size: u64,
    pub compressed_size: Option<u64>,
}

impl RecordHeader {
    // How many bytes the body occupies on disk.
    pub fn disk_size(&self) -> u64 {
        self.compressed_size.unwrap_or(self.uncompressed_size)
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed_size.is_some()
    }
}

impl Message for RecordHeader {
    fn to_bytes(&self, buf: &mut Vec<u8>) {
        let mut fields = FieldWriter::new(buf);
        fields.put(TAG_UNCOMPRESSED_SIZE, self.uncompressed_size);
        if let Some(size) = self.compressed_size {
            fields.put(TAG_COMPRESSED_SIZE, size);
        }
    }

    fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        let mut uncompressed_size = None;
        let mut compressed_size = None;
        let mut fields = FieldReader::new(bytes);
        while let Some((tag, value)) = fields.next()? {
            let slot = match tag {
                TAG_UNCOMPRESSED_SIZE => &mut uncompressed_size,
                TAG_COMPRESSED_SIZE => &mut compressed_size,
                _ => bail!("unknown header field tag {}", tag),
            };
            if slot.replace(value).is_some() {
                bail!("duplicate header field tag {}", tag);
            }
        }
        match uncompressed_size {
            Some(uncompressed_size) => Ok(RecordHeader {
                uncompressed_size,
                compressed_size,
            }),
            None => bail!("header is missing the uncompressed size"),
        }
    }
}

// Compresses one record body. None means the attempt failed and the record
// should be stored uncompressed.
pub(crate) fn compress(source: &[u8]) -> Option<Vec<u8>> {
    // Sized to zlib's worst case so the buffer does not grow mid-compress.
    let bound = source.len() + source.len() / 10 + 16;
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(bound), Compression::default());
    let result = encoder.write_all(source).and_then(|()| encoder.finish());
    match result {
        Ok(compressed) => Some(compressed),
        Err(err) => {
            log::warn!("record compression failed, storing uncompressed: {}", err);
            None
        }
    }
}

// Decompresses one record body into a buffer sized from the header. The
// result must come out to exactly the length the header promised.
pub(crate) fn decompress(body: &[u8], uncompressed_size: u64) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(uncompressed_size as usize);
    let mut decoder = ZlibDecoder::new(body).take(uncompressed_size.saturating_add(1));
    decoder.read_to_end(&mut out).map_err(Error::Decompress)?;
    if out.len() as u64 != uncompressed_size {
        return Err(Error::SizeMismatch {
            got: out.len() as u64,
            want: uncompressed_size,
        });
    }
    Ok(out)
}
