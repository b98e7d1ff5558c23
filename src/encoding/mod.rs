use anyhow::bail;

// A field is a one-byte tag followed by a fixed-width little-endian u64.
// Decoders see which tags are present rather than assuming an order, so
// the absence of a field is representable.
const FIELD_LEN: usize = 9;

// A typed object that can travel as a record payload. Serialization cannot
// fail; parsing foreign bytes can.
pub trait Message: std::fmt::Debug + Sized {
    fn to_bytes(&self, buf: &mut Vec<u8>);
    fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self>;
}

#[derive(Debug)]
pub struct FieldWriter<'a> {
    buf: &'a mut Vec<u8>,
}

impl<'a> FieldWriter<'a> {
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        FieldWriter { buf }
    }

    pub fn put(&mut self, tag: u8, value: u64) {
        self.buf.push(tag);
        self.buf.extend(value.to_le_bytes());
    }
}

pub struct FieldReader<'a> {
    buf: &'a [u8],
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        FieldReader { buf }
    }

    pub fn next(&mut self) -> anyhow::Result<Option<(u8, u64)>> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        if self.buf.len() < FIELD_LEN {
            bail!("partial field: {} trailing bytes", self.buf.len());
        }
        let tag = self.buf[0];
        let value = u64::from_le_bytes(self.buf[1..FIELD_LEN].try_into().unwrap());
        self.buf = &self.buf[FIELD_LEN..];
        Ok(Some((tag, value)))
    }
}

#[test]
fn test_field_round_trip() {
    let mut buf = Vec::new();
    let mut w = FieldWriter::new(&mut buf);
    w.put(1, 8);
    w.put(2, u64::MAX);
    assert_eq!(buf.len(), 2 * FIELD_LEN);

    let mut r = FieldReader::new(&buf);
    assert_eq!(r.next().unwrap(), Some((1, 8)));
    assert_eq!(r.next().unwrap(), Some((2, u64::MAX)));
    assert_eq!(r.next().unwrap(), None);
    assert_eq!(r.next().unwrap(), None);
}

#[test]
fn test_partial_field() {
    let mut buf = Vec::new();
    let mut w = FieldWriter::new(&mut buf);
    w.put(1, 100);
    w.put(2, 200);

    let mut r = FieldReader::new(&buf[..FIELD_LEN + 4]);
    assert_eq!(r.next().unwrap(), Some((1, 100)));
    assert!(r.next().is_err());
}
