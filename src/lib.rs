mod encoding;
mod error;
mod record;
mod stream;

pub use encoding::{FieldReader, FieldWriter, Message};
pub use error::{Error, Result};
pub use record::{reader::RecordReader, writer::RecordWriter, RecordHeader, MAGIC};
pub use stream::{Event, FileStream, MockStream, RecordStream};
