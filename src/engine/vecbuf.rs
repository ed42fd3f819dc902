use crate::engine::buf::{AppendBuf, ReadBuf};

/// Growable in-memory buffer. Records are encoded here before compression and
/// decoded from here after decompression.
pub struct Vecbuf {
    buf: Vec<u8>,
    pos: usize,
    eof: bool,
}

impl Vecbuf {
    pub fn new() -> Vecbuf {
        Vecbuf {
            buf: Vec::new(),
            pos: 0,
            eof: false,
        }
    }

    pub fn from_vec(buf: Vec<u8>) -> Vecbuf {
        Vecbuf {
            buf,
            pos: 0,
            eof: false,
        }
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.pos = 0;
        self.eof = false;
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        self.buf.as_slice()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for Vecbuf {
    fn default() -> Self {
        Vecbuf::new()
    }
}

impl ReadBuf for Vecbuf {
    #[inline]
    fn seek(&mut self, pos: usize) -> usize {
        self.pos = pos.min(self.len());
        self.eof = false;
        self.pos
    }

    #[inline]
    fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    fn readb(&mut self) -> u8 {
        if self.pos < self.len() {
            let r = self.buf[self.pos];
            self.pos += 1;
            r
        } else {
            self.eof = true;
            0
        }
    }

    #[inline]
    fn past_eof(&mut self) -> bool {
        self.eof
    }
}

impl AppendBuf for Vecbuf {
    #[inline]
    fn flush(&mut self) -> std::io::Result<()> {
        // does nothing for Vecbuf
        Ok(())
    }

    #[inline]
    fn writeb(&mut self, b: u8) {
        if self.pos < self.buf.len() {
            self.buf[self.pos] = b;
        } else {
            self.buf.push(b);
        }
        self.pos += 1;
    }
}

#[test]
fn test_overwrite_then_grow() {
    let mut vb = Vecbuf::new();
    vb.write_slice(&[1, 2, 3]);
    vb.seek(1);
    vb.write_slice(&[9, 9, 9]);
    assert_eq!(vb.as_slice(), &[1, 9, 9, 9]);
}

#[test]
fn test_read_past_end() {
    let mut vb = Vecbuf::from_vec(vec![7]);
    assert_eq!(vb.readb(), 7);
    assert!(!vb.past_eof());
    assert_eq!(vb.readb(), 0);
    assert!(vb.past_eof());
    vb.seek(0);
    assert!(!vb.past_eof());
}
