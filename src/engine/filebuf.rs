use std::fs::File;
use std::io::{self, Write};

use crate::engine::buf::AppendBuf;

/// Buffered append-only file sink. Write errors are latched and returned by
/// `take_error` or the next `flush`.
pub struct FileBuf {
    f: File,
    fpos: u64,
    buf: Vec<u8>,
    bpos: usize,
    err: Option<io::Error>,
}

impl FileBuf {
    pub fn new(f: File, bufsize: usize) -> FileBuf {
        FileBuf {
            f,
            fpos: 0,
            buf: vec![0; bufsize.max(1)],
            bpos: 0,
            err: None,
        }
    }

    /// Absolute offset of the next byte written.
    pub fn position(&self) -> u64 {
        self.fpos + self.bpos as u64
    }

    /// Returns the latched write error, if any, and clears it.
    pub fn take_error(&mut self) -> Option<io::Error> {
        self.err.take()
    }

    fn flush_buffer(&mut self) {
        if self.bpos == 0 || self.err.is_some() {
            return;
        }
        match self.f.write_all(&self.buf[0..self.bpos]) {
            Ok(()) => {
                self.fpos += self.bpos as u64;
                self.bpos = 0;
            }
            Err(e) => self.err = Some(e),
        }
    }
}

impl AppendBuf for FileBuf {
    fn flush(&mut self) -> io::Result<()> {
        self.flush_buffer();
        if let Some(e) = self.err.take() {
            return Err(e);
        }
        self.f.flush()
    }

    #[inline]
    fn writeb(&mut self, b: u8) {
        if self.bpos >= self.buf.len() {
            self.flush_buffer();
            if self.err.is_some() {
                return;
            }
        }
        self.buf[self.bpos] = b;
        self.bpos += 1;
    }
}

#[test]
fn test_small_buffer_keeps_every_byte() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("filebuf.dat");
    {
        let f = File::create(&path).unwrap();
        let mut fb = FileBuf::new(f, 4);
        fb.write_slice(b"0123456789");
        assert_eq!(fb.position(), 10);
        fb.flush().unwrap();
    }
    assert_eq!(std::fs::read(&path).unwrap(), b"0123456789");
}

#[cfg(target_os = "linux")]
#[test]
fn test_write_error_is_latched() {
    let f = File::create("/dev/full").unwrap();
    let mut fb = FileBuf::new(f, 4);
    fb.write_slice(b"0123456789");
    let e = fb.take_error().unwrap();
    assert_eq!(e.raw_os_error(), Some(28)); // ENOSPC
    assert!(fb.take_error().is_none());
    assert!(fb.flush().is_err());
}
