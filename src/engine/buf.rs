/// Byte source with an absolute position. Reading past the end yields zeroes
/// and latches `past_eof`, so decoders check once after a run of reads.
pub trait ReadBuf {
    fn seek(&mut self, pos: usize) -> usize;
    fn pos(&self) -> usize;
    fn readb(&mut self) -> u8;
    fn past_eof(&mut self) -> bool;
}

/// Byte sink. Sinks that can fail latch the error and report it on `flush`.
pub trait AppendBuf {
    fn writeb(&mut self, u: u8);
    fn flush(&mut self) -> std::io::Result<()>;

    fn write_slice(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.writeb(*b);
        }
    }
}
