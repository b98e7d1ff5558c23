use std::{
    cell::RefCell,
    fs::File,
    io::{self, Read, Write},
    path::Path,
    rc::Rc,
};

// The byte-stream resource records are framed onto. Reads and writes are
// single calls against the underlying resource: callers see exactly how
// many bytes transferred and decide what a short transfer means. There is
// no retrying at this layer.
pub trait RecordStream: std::fmt::Debug {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    fn close(&mut self) -> io::Result<()>;
}

impl<S: RecordStream> RecordStream for &mut S {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

// A stream over a regular file. The handle lives in an Option so that
// closing releases it exactly once; anything after that is an error.
#[derive(Debug)]
pub struct FileStream {
    file: Option<File>,
    writable: bool,
}

impl FileStream {
    pub fn create<P>(path: P) -> io::Result<Self>
    where
        P: AsRef<Path>,
    {
        let file = File::create(path)?;
        Ok(FileStream {
            file: Some(file),
            writable: true,
        })
    }

    pub fn open<P>(path: P) -> io::Result<Self>
    where
        P: AsRef<Path>,
    {
        let file = File::open(path)?;
        Ok(FileStream {
            file: Some(file),
            writable: false,
        })
    }

    fn file(&mut self) -> io::Result<&mut File> {
        match &mut self.file {
            Some(file) => Ok(file),
            None => Err(io::Error::new(io::ErrorKind::Other, "stream is closed")),
        }
    }
}

impl RecordStream for FileStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file()?.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file()?.write_all(buf)?;
        Ok(buf.len())
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(file) = self.file.take() {
            if self.writable {
                file.sync_all()?;
            }
        }
        Ok(())
    }
}

// Mock implementation
#[derive(Debug, Clone)]
pub enum Event {
    Write(Vec<u8>),
    Read(usize),
    Close,
}

impl Event {
    pub fn write_abbrev<W: std::fmt::Write>(&self, w: &mut W) -> std::fmt::Result {
        match self {
            Event::Write(contents) => {
                write!(
                    w,
                    "Write({})",
                    String::from_utf8(
                        contents
                            .iter()
                            .flat_map(|ch| std::ascii::escape_default(*ch))
                            .collect::<Vec<u8>>()
                    )
                    .unwrap()
                )?;
            }
            Event::Read(n) => {
                write!(w, "Read({})", n)?;
            }
            Event::Close => {
                write!(w, "Close()")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct StreamState {
    data: Vec<u8>,
    pos: usize,
    closed: bool,
    events: Vec<Event>,
    short_write: Option<usize>,
}

// An in-memory stream. Writes append to a shared byte buffer, reads walk a
// cursor over it, and every operation lands in an event log. Clones share
// state, so a test can hand one handle to a writer and keep another to
// inspect or damage the bytes.
#[derive(Debug, Clone)]
pub struct MockStream {
    state: Rc<RefCell<StreamState>>,
}

impl MockStream {
    pub fn new() -> Self {
        MockStream {
            state: Rc::new(RefCell::new(StreamState::default())),
        }
    }

    pub fn with_data(data: Vec<u8>) -> Self {
        let stream = MockStream::new();
        (*stream.state).borrow_mut().data = data;
        stream
    }

    pub fn data(&self) -> Vec<u8> {
        (*self.state).borrow().data.clone()
    }

    pub fn set_data(&self, data: Vec<u8>) {
        (*self.state).borrow_mut().data = data;
    }

    pub fn rewind(&self) {
        (*self.state).borrow_mut().pos = 0;
    }

    pub fn take_events(&self) -> Vec<Event> {
        std::mem::take(&mut (*self.state).borrow_mut().events)
    }

    // The next write transfers at most `n` bytes, once.
    pub fn short_write_next(&self, n: usize) {
        (*self.state).borrow_mut().short_write = Some(n);
    }
}

impl RecordStream for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = (*self.state).borrow_mut();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::Other, "stream is closed"));
        }
        let n = std::cmp::min(buf.len(), state.data.len().saturating_sub(state.pos));
        buf[..n].copy_from_slice(&state.data[state.pos..state.pos + n]);
        state.pos += n;
        state.events.push(Event::Read(n));
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = (*self.state).borrow_mut();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::Other, "stream is closed"));
        }
        let n = match state.short_write.take() {
            Some(n) => std::cmp::min(n, buf.len()),
            None => buf.len(),
        };
        state.data.extend(&buf[..n]);
        state.events.push(Event::Write(buf[..n].to_vec()));
        Ok(n)
    }

    fn close(&mut self) -> io::Result<()> {
        let mut state = (*self.state).borrow_mut();
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::Other, "stream already closed"));
        }
        state.closed = true;
        state.events.push(Event::Close);
        Ok(())
    }
}

#[test]
fn test_mock_stream() -> anyhow::Result<()> {
    let mut s = MockStream::new();

    assert_eq!(s.write(&[1, 2, 3, 4])?, 4);
    assert_eq!(s.write(&[5, 6])?, 2);
    assert_eq!(s.data(), vec![1, 2, 3, 4, 5, 6]);

    let mut buf = [0_u8; 4];
    assert_eq!(s.read(&mut buf)?, 4);
    assert_eq!(buf, [1, 2, 3, 4]);
    assert_eq!(s.read(&mut buf)?, 2);
    assert_eq!(s.read(&mut buf)?, 0);

    s.rewind();
    assert_eq!(s.read(&mut buf)?, 4);

    s.short_write_next(1);
    assert_eq!(s.write(&[7, 8])?, 1);
    assert_eq!(s.write(&[9])?, 1);
    assert_eq!(s.data(), vec![1, 2, 3, 4, 5, 6, 7, 9]);

    s.close()?;
    assert!(s.close().is_err());
    assert!(s.read(&mut buf).is_err());
    assert!(s.write(&[0]).is_err());

    Ok(())
}

#[test]
fn test_event_abbrev() {
    let events = vec![
        Event::Write(vec![0x39, 0x10, 0x73, 0x4e]),
        Event::Write(b"RECORD 1".to_vec()),
        Event::Read(4),
        Event::Close,
    ];
    let mut out = String::new();
    for event in &events {
        event.write_abbrev(&mut out).unwrap();
        out.push('\n');
    }
    assert_eq!(out, "Write(9\\x10sN)\nWrite(RECORD 1)\nRead(4)\nClose()\n");
}
