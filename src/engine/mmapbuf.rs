use std::fs::File;
use std::io;

use memmap::Mmap;

use crate::engine::buf::ReadBuf;

/// Read-only view of a whole file.
pub struct MmapBuf {
    m: Mmap,
    pos: usize,
}

impl MmapBuf {
    /// Maps `f`. Empty files cannot be mapped; callers check the length first.
    pub fn new(f: &File) -> io::Result<MmapBuf> {
        let m = unsafe { Mmap::map(f)? };
        Ok(MmapBuf { m, pos: 0 })
    }

    pub fn len(&self) -> usize {
        self.m.len()
    }

    pub fn is_empty(&self) -> bool {
        self.m.is_empty()
    }

    pub fn slice(&self, start: usize, end: usize) -> Option<&[u8]> {
        if start <= end && end <= self.m.len() {
            Some(&self.m[start..end])
        } else {
            None
        }
    }
}

impl ReadBuf for MmapBuf {
    #[inline]
    fn past_eof(&mut self) -> bool {
        // only report eof once we are PAST it
        self.pos > self.m.len()
    }

    #[inline]
    fn seek(&mut self, pos: usize) -> usize {
        self.pos = pos.min(self.m.len());
        self.pos
    }

    #[inline]
    fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    fn readb(&mut self) -> u8 {
        if self.pos >= self.m.len() {
            // have to advance the pos to make past_eof work
            self.pos += 1;
            0
        } else {
            let u = self.m[self.pos];
            self.pos += 1;
            u
        }
    }
}
