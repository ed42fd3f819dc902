use std::io::{Read, Write};

use crate::catalog::{Catalog, FieldDescriptor};
use crate::engine::adlerbuf::{AppendBufAdler32, ReadBufAdler32};
use crate::engine::buf::{AppendBuf, ReadBuf};
use crate::engine::err::DecodeError;
use crate::engine::vecbuf::Vecbuf;
use crate::types::{ChecksumType, CompressionType, FieldData, FieldType, Value};

pub const MAGIC: [u8; 4] = *b"XCDF";
pub const FOOTER_MAGIC: [u8; 4] = *b"XCDT";
pub const VERSION: u8 = 3;
pub const FOOTER_LEN: usize = 12;

pub const RECORD_MARKER: u8 = b'R';
pub const TRAILER_MARKER: u8 = b'T';

const FLAG_ADLER32: u8 = 0x01;

const RAW: u8 = 0;
const LZ4: u8 = b'L';
const ZSTD: u8 = b'Z';

// lz4 for small blocks, zstd above this
const AUTO_THRESHOLD: usize = 4096;

type Decoded<T> = Result<T, DecodeError>;

fn write_db<B: AppendBuf>(b: &mut B, v: u8) {
    b.writeb(v);
}

fn read_db<B: ReadBuf>(b: &mut B) -> Decoded<u8> {
    let v = b.readb();
    if b.past_eof() {
        return Err(DecodeError::UnexpectedEof);
    }
    Ok(v)
}

pub fn write_varint<B: AppendBuf>(b: &mut B, v: u64) {
    let mut r = v;
    loop {
        let mut x7 = (r & 0x7f) as u8;
        r >>= 7;
        if r != 0 {
            x7 |= 0x80;
        }
        write_db(b, x7);
        if r == 0 {
            break;
        }
    }
}

pub fn read_varint<B: ReadBuf>(b: &mut B) -> Decoded<u64> {
    let mut bits: u32 = 0;
    let mut r: u64 = 0;
    loop {
        let u = read_db(b)?;
        if bits >= 64 || (bits == 63 && (u & 0x7e) != 0) {
            return Err(DecodeError::InvalidVarint);
        }
        r |= ((u & 0x7f) as u64) << bits;
        bits += 7;
        if u & 0x80 == 0 {
            return Ok(r);
        }
    }
}

fn read_len<B: ReadBuf>(b: &mut B) -> Decoded<usize> {
    let v = read_varint(b)?;
    usize::try_from(v).map_err(|_| DecodeError::InvalidVarint)
}

pub fn zigzag(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

pub fn unzigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

pub fn write_dd_le<B: AppendBuf>(b: &mut B, v: u32) {
    b.write_slice(&v.to_le_bytes());
}

pub fn read_dd_le<B: ReadBuf>(b: &mut B) -> Decoded<u32> {
    let mut x = [0u8; 4];
    for byte in x.iter_mut() {
        *byte = b.readb();
    }
    if b.past_eof() {
        return Err(DecodeError::UnexpectedEof);
    }
    Ok(u32::from_le_bytes(x))
}

pub fn write_dq_le<B: AppendBuf>(b: &mut B, v: u64) {
    b.write_slice(&v.to_le_bytes());
}

pub fn read_dq_le<B: ReadBuf>(b: &mut B) -> Decoded<u64> {
    let mut x = [0u8; 8];
    for byte in x.iter_mut() {
        *byte = b.readb();
    }
    if b.past_eof() {
        return Err(DecodeError::UnexpectedEof);
    }
    Ok(u64::from_le_bytes(x))
}

fn read_bytes<B: ReadBuf>(b: &mut B, size: usize) -> Decoded<Vec<u8>> {
    let mut bytes = Vec::with_capacity(size.min(1 << 20));
    for _ in 0..size {
        bytes.push(b.readb());
        if b.past_eof() {
            return Err(DecodeError::UnexpectedEof);
        }
    }
    Ok(bytes)
}

fn lz4_compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut co = lz4::EncoderBuilder::new()
        .checksum(lz4::ContentChecksum::NoChecksum)
        .block_size(lz4::BlockSize::Default)
        .block_mode(lz4::BlockMode::Linked)
        .build(Vec::new())?;
    co.write_all(data)?;
    let (outbuf, res) = co.finish();
    res?;
    Ok(outbuf)
}

fn zstd_compress(data: &[u8], level: i32) -> std::io::Result<Vec<u8>> {
    let mut encoder = zstd::stream::Encoder::new(Vec::new(), level)?;
    encoder.write_all(data)?;
    encoder.finish()
}

/// Compresses `data` according to `ctype`. Returns the marker byte and the
/// stored bytes; the raw bytes are kept when compression does not shrink them.
pub fn compress(data: &[u8], ctype: CompressionType, level: i32) -> (u8, Vec<u8>) {
    let attempt = match ctype {
        CompressionType::None => None,
        CompressionType::Lz4 => lz4_compress(data).ok().map(|v| (LZ4, v)),
        CompressionType::Zstd => zstd_compress(data, level).ok().map(|v| (ZSTD, v)),
        CompressionType::Auto => {
            if data.len() < AUTO_THRESHOLD {
                lz4_compress(data).ok().map(|v| (LZ4, v))
            } else {
                zstd_compress(data, level).ok().map(|v| (ZSTD, v))
            }
        }
    };
    match attempt {
        Some((marker, outbuf)) if outbuf.len() < data.len() => (marker, outbuf),
        _ => (RAW, data.to_vec()),
    }
}

pub fn decompress(marker: u8, stored: Vec<u8>) -> Decoded<Vec<u8>> {
    match marker {
        RAW => Ok(stored),
        LZ4 => {
            let mut d =
                lz4::Decoder::new(stored.as_slice()).map_err(|_| DecodeError::DecompressionError)?;
            let mut dbuf: Vec<u8> = Vec::new();
            d.read_to_end(&mut dbuf)
                .map_err(|_| DecodeError::DecompressionError)?;
            Ok(dbuf)
        }
        ZSTD => {
            let mut d = zstd::Decoder::new(stored.as_slice())
                .map_err(|_| DecodeError::DecompressionError)?;
            let mut dbuf: Vec<u8> = Vec::new();
            d.read_to_end(&mut dbuf)
                .map_err(|_| DecodeError::DecompressionError)?;
            Ok(dbuf)
        }
        other => Err(DecodeError::UnknownCompression(other)),
    }
}

// write variable sized string
pub fn write_varstring<B: AppendBuf>(b: &mut B, s: &str) {
    let (marker, stored) = compress(s.as_bytes(), CompressionType::Auto, 5);
    write_db(b, marker);
    write_varint(b, stored.len() as u64);
    b.write_slice(&stored);
}

pub fn read_varstring<B: ReadBuf>(b: &mut B) -> Decoded<String> {
    let marker = read_db(b)?;
    let size = read_len(b)?;
    let stored = read_bytes(b, size)?;
    let bytes = decompress(marker, stored)?;
    String::from_utf8(bytes).map_err(|_| DecodeError::BadUtf8)
}

fn type_byte(ftype: FieldType) -> u8 {
    match ftype {
        FieldType::UnsignedInteger => b'U',
        FieldType::SignedInteger => b'S',
        FieldType::FloatingPoint => b'F',
    }
}

pub fn write_header<B: AppendBuf>(buf: &mut B, catalog: &Catalog, checksum: ChecksumType) {
    buf.write_slice(&MAGIC);
    write_db(buf, VERSION);
    let flags = match checksum {
        ChecksumType::Adler32 => FLAG_ADLER32,
        ChecksumType::None => 0,
    };
    write_db(buf, flags);
    write_varint(buf, catalog.len() as u64);

    for field in catalog.fields() {
        write_varstring(buf, &field.name);
        write_db(buf, type_byte(field.ftype));
        match field.resolution.coerce(field.ftype) {
            Value::Unsigned(v) => write_varint(buf, v),
            Value::Signed(v) => write_varint(buf, zigzag(v)),
            Value::Float(v) => write_dq_le(buf, v.to_bits()),
        }
        write_varstring(buf, field.parent.as_deref().unwrap_or(""));
    }
}

pub fn read_header<B: ReadBuf>(buf: &mut B) -> Decoded<(Catalog, ChecksumType)> {
    let mut magic = [0u8; 4];
    for byte in magic.iter_mut() {
        *byte = buf.readb();
    }
    if buf.past_eof() {
        return Err(DecodeError::UnexpectedEof);
    }
    if magic != MAGIC {
        return Err(DecodeError::BadMagic(magic));
    }
    let version = read_db(buf)?;
    if version != VERSION {
        return Err(DecodeError::UnsupportedVersion(version));
    }
    let flags = read_db(buf)?;
    let checksum = if flags & FLAG_ADLER32 != 0 {
        ChecksumType::Adler32
    } else {
        ChecksumType::None
    };

    let mut catalog = Catalog::new();
    let num_fields = read_len(buf)?;
    for _ in 0..num_fields {
        let name = read_varstring(buf)?;
        let ftype = match read_db(buf)? {
            b'U' => FieldType::UnsignedInteger,
            b'S' => FieldType::SignedInteger,
            b'F' => FieldType::FloatingPoint,
            other => return Err(DecodeError::UnknownFieldType(other)),
        };
        let resolution = match ftype {
            FieldType::UnsignedInteger => Value::Unsigned(read_varint(buf)?),
            FieldType::SignedInteger => Value::Signed(unzigzag(read_varint(buf)?)),
            FieldType::FloatingPoint => Value::Float(f64::from_bits(read_dq_le(buf)?)),
        };
        let parent = read_varstring(buf)?;
        let parent = if parent.is_empty() { None } else { Some(parent) };
        catalog
            .add(FieldDescriptor::new(&name, ftype, resolution, parent.as_deref()))
            .map_err(|e| DecodeError::InvalidCatalog(e.to_string()))?;
    }
    Ok((catalog, checksum))
}

/// Number of elements a field holds in the record being encoded or decoded.
/// Vector fields take it from their parent's single value.
fn element_count(catalog: &Catalog, values: &[FieldData], n: usize) -> Option<usize> {
    let p = catalog.parent_index(n)?;
    let count = match values[p].get(0) {
        Some(v) if values[p].len() == 1 => v.as_u64() as usize,
        _ => 0,
    };
    Some(count)
}

/// Encodes one record into `out`. Vector lengths must already be validated
/// against their parents.
pub fn encode_record(catalog: &Catalog, values: &[FieldData], out: &mut Vecbuf) {
    debug_assert_eq!(values.len(), catalog.len());

    for (n, field) in catalog.fields().iter().enumerate() {
        if element_count(catalog, values, n).is_none() {
            write_varint(out, values[n].len() as u64);
        }
        match (&values[n], field.resolution) {
            (FieldData::Unsigned(v), res) => {
                let res = res.as_u64().max(1);
                for x in v {
                    write_varint(out, x / res);
                }
            }
            (FieldData::Signed(v), res) => {
                let res = res.as_i64().max(1);
                for x in v {
                    write_varint(out, zigzag(x / res));
                }
            }
            (FieldData::Float(v), _) => {
                for x in v {
                    write_dq_le(out, x.to_bits());
                }
            }
        }
    }
}

/// Decodes one record payload into `values`, replacing their contents.
pub fn decode_record(catalog: &Catalog, payload: Vec<u8>, values: &mut [FieldData]) -> Decoded<()> {
    let mut b = Vecbuf::from_vec(payload);
    let total = b.len();

    for n in 0..catalog.len() {
        let count = match element_count(catalog, values, n) {
            Some(c) => c,
            None => read_len(&mut b)?,
        };
        // every value takes at least one byte
        if count > total - b.pos() {
            return Err(DecodeError::MalformedRecord(format!(
                "field '{}' claims {} values",
                catalog.field(n).name,
                count
            )));
        }
        let res = catalog.field(n).resolution;
        match &mut values[n] {
            FieldData::Unsigned(v) => {
                v.clear();
                let res = res.as_u64().max(1);
                for _ in 0..count {
                    v.push(read_varint(&mut b)?.wrapping_mul(res));
                }
            }
            FieldData::Signed(v) => {
                v.clear();
                let res = res.as_i64().max(1);
                for _ in 0..count {
                    v.push(unzigzag(read_varint(&mut b)?).wrapping_mul(res));
                }
            }
            FieldData::Float(v) => {
                v.clear();
                for _ in 0..count {
                    v.push(f64::from_bits(read_dq_le(&mut b)?));
                }
            }
        }
    }
    if b.pos() != total {
        return Err(DecodeError::MalformedRecord(format!(
            "{} trailing bytes",
            total - b.pos()
        )));
    }
    Ok(())
}

/// Appends a record block holding `payload`.
pub fn write_record_block<B: AppendBuf>(
    buf: &mut B,
    payload: &[u8],
    compression: CompressionType,
    level: i32,
    checksum: ChecksumType,
) {
    let (marker, stored) = compress(payload, compression, level);
    write_db(buf, RECORD_MARKER);
    let hash = {
        let mut adlerbuf = AppendBufAdler32::<B>::new(buf);
        write_db(&mut adlerbuf, marker);
        write_varint(&mut adlerbuf, stored.len() as u64);
        adlerbuf.write_slice(&stored);
        adlerbuf.hash()
    };
    if checksum == ChecksumType::Adler32 {
        write_dd_le(buf, hash);
    }
}

/// Reads the record block starting at the current position and returns its
/// decompressed payload.
pub fn read_record_block<B: ReadBuf>(
    buf: &mut B,
    checksum: ChecksumType,
    verify: bool,
) -> Decoded<Vec<u8>> {
    let first = buf.readb();
    if buf.past_eof() {
        return Err(DecodeError::Eof);
    }
    if first != RECORD_MARKER {
        return Err(DecodeError::UnexpectedMarker(first));
    }
    let (marker, stored, hash) = {
        let mut adlerbuf = ReadBufAdler32::<B>::new(buf);
        let marker = read_db(&mut adlerbuf)?;
        let size = read_len(&mut adlerbuf)?;
        let stored = read_bytes(&mut adlerbuf, size)?;
        (marker, stored, adlerbuf.hash())
    };
    if checksum == ChecksumType::Adler32 {
        let fhash = read_dd_le(buf)?;
        if verify && hash != fhash {
            return Err(DecodeError::ChecksumError);
        }
    }
    decompress(marker, stored)
}

pub fn write_trailer<B: AppendBuf>(buf: &mut B, offsets: &[u64], trailer_offset: u64) {
    write_db(buf, TRAILER_MARKER);
    write_varint(buf, offsets.len() as u64);
    let mut last = 0;
    for off in offsets {
        write_varint(buf, off - last);
        last = *off;
    }
    write_dq_le(buf, trailer_offset);
    buf.write_slice(&FOOTER_MAGIC);
}

/// Reads the seek index through the footer at the end of a `len` byte file.
/// Returns `Ok(None)` when no footer is present.
pub fn read_trailer<B: ReadBuf>(buf: &mut B, len: usize, data_start: usize) -> Decoded<Option<Vec<usize>>> {
    if len < data_start + FOOTER_LEN + 1 {
        return Ok(None);
    }
    buf.seek(len - 4);
    let mut magic = [0u8; 4];
    for byte in magic.iter_mut() {
        *byte = read_db(buf)?;
    }
    if magic != FOOTER_MAGIC {
        return Ok(None);
    }
    buf.seek(len - FOOTER_LEN);
    let trailer_offset = read_dq_le(buf)? as usize;
    if trailer_offset < data_start || trailer_offset >= len - FOOTER_LEN {
        return Err(DecodeError::MalformedRecord("trailer offset out of range".to_owned()));
    }
    buf.seek(trailer_offset);
    let marker = read_db(buf)?;
    if marker != TRAILER_MARKER {
        return Err(DecodeError::UnexpectedMarker(marker));
    }
    let count = read_len(buf)?;
    if count > trailer_offset {
        return Err(DecodeError::MalformedRecord("record count exceeds file size".to_owned()));
    }
    let mut offsets = Vec::with_capacity(count);
    let mut last = 0usize;
    for _ in 0..count {
        let off = last
            .checked_add(read_len(buf)?)
            .ok_or(DecodeError::InvalidVarint)?;
        if off < data_start || off >= trailer_offset {
            return Err(DecodeError::MalformedRecord("record offset out of range".to_owned()));
        }
        offsets.push(off);
        last = off;
    }
    Ok(Some(offsets))
}

/// Walks the record blocks from `data_start`, collecting their offsets. Used
/// when a file lacks a footer. Stops at the trailer, at the end of the data,
/// or at the first block that does not decode.
pub fn scan_records<B: ReadBuf>(buf: &mut B, data_start: usize, checksum: ChecksumType) -> Vec<usize> {
    let mut offsets = Vec::new();
    buf.seek(data_start);
    loop {
        let pos = buf.pos();
        match read_record_block(buf, checksum, false) {
            Ok(_) => offsets.push(pos),
            Err(_) => break,
        }
    }
    offsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_varint() {
        let mut sb = Vecbuf::new();
        for u in &[0u64, 0x12, 0x80, 0xff, 0x17f, u64::MAX] {
            sb.reset();
            write_varint(&mut sb, *u);
            sb.seek(0);
            assert_eq!(read_varint(&mut sb).unwrap(), *u);
        }
    }

    #[test]
    fn test_varint_truncated() {
        let mut sb = Vecbuf::from_vec(vec![0x80, 0x80]);
        assert_eq!(read_varint(&mut sb), Err(DecodeError::UnexpectedEof));
        let mut sb = Vecbuf::from_vec(vec![0xff; 11]);
        assert_eq!(read_varint(&mut sb), Err(DecodeError::InvalidVarint));
    }

    #[test]
    fn test_varstring() {
        let mut sb = Vecbuf::new();
        let long = (0..8192).map(|_| "X").collect::<String>();
        write_varstring(&mut sb, "hello_world");
        write_varstring(&mut sb, &long);
        sb.seek(0);
        assert_eq!(read_varstring(&mut sb).unwrap(), "hello_world");
        assert_eq!(read_varstring(&mut sb).unwrap(), long);
        // 8k of one letter compresses well below its size
        assert!(sb.len() < 1024);
    }

    #[test]
    fn test_header_rw() {
        let mut c = Catalog::new();
        c.add(FieldDescriptor::new("nhit", FieldType::UnsignedInteger, Value::Unsigned(1), None))
            .unwrap();
        c.add(FieldDescriptor::new("t", FieldType::SignedInteger, Value::Signed(10), None))
            .unwrap();
        c.add(FieldDescriptor::new("hit.x", FieldType::FloatingPoint, Value::Float(0.01), Some("nhit")))
            .unwrap();

        let mut vb = Vecbuf::new();
        write_header(&mut vb, &c, ChecksumType::Adler32);
        vb.seek(0);
        let (sch, checksum) = read_header(&mut vb).unwrap();
        assert_eq!(checksum, ChecksumType::Adler32);
        assert_eq!(sch.fields(), c.fields());
        assert_eq!(sch.parent_index(2), Some(0));
    }

    #[test]
    fn test_header_bad_magic() {
        let mut vb = Vecbuf::from_vec(b"XCDX\x03\x00\x00".to_vec());
        assert!(matches!(read_header(&mut vb), Err(DecodeError::BadMagic(_))));
    }

    #[test]
    fn test_record_quantization() {
        let mut c = Catalog::new();
        c.add(FieldDescriptor::new("u", FieldType::UnsignedInteger, Value::Unsigned(10), None))
            .unwrap();
        c.add(FieldDescriptor::new("s", FieldType::SignedInteger, Value::Signed(4), None))
            .unwrap();
        let values = vec![FieldData::Unsigned(vec![127]), FieldData::Signed(vec![-9])];
        let mut vb = Vecbuf::new();
        encode_record(&c, &values, &mut vb);

        let mut out = vec![FieldData::Unsigned(vec![]), FieldData::Signed(vec![])];
        decode_record(&c, vb.into_vec(), &mut out).unwrap();
        assert_eq!(out[0], FieldData::Unsigned(vec![120]));
        assert_eq!(out[1], FieldData::Signed(vec![-8]));
    }

    #[test]
    fn test_record_block_checksum() {
        let mut vb = Vecbuf::new();
        write_record_block(&mut vb, b"abcdef", CompressionType::None, 5, ChecksumType::Adler32);
        let mut bytes = vb.into_vec();
        let n = bytes.len();
        bytes[n - 6] ^= 0xff; // flip a payload byte

        let mut rb = Vecbuf::from_vec(bytes.clone());
        assert_eq!(read_record_block(&mut rb, ChecksumType::Adler32, true), Err(DecodeError::ChecksumError));
        let mut rb = Vecbuf::from_vec(bytes);
        assert!(read_record_block(&mut rb, ChecksumType::Adler32, false).is_ok());
    }

    #[test]
    fn test_trailer_rw() {
        let mut vb = Vecbuf::new();
        vb.write_slice(&[0; 20]);
        let offsets = vec![4u64, 9, 15];
        write_trailer(&mut vb, &offsets, 20);
        let len = vb.len();
        let found = read_trailer(&mut vb, len, 4).unwrap().unwrap();
        assert_eq!(found, vec![4, 9, 15]);
    }

    #[test]
    fn test_no_trailer() {
        let mut vb = Vecbuf::from_vec(vec![0; 40]);
        assert_eq!(read_trailer(&mut vb, 40, 4).unwrap(), None);
    }

    proptest! {
        #[test]
        fn zigzag_inverts(v in any::<i64>()) {
            prop_assert_eq!(unzigzag(zigzag(v)), v);
        }

        #[test]
        fn compressed_blocks_decode(data in proptest::collection::vec(any::<u8>(), 0..6000),
                                    zero_run in 0usize..6000) {
            let mut payload = data;
            payload.extend(std::iter::repeat(0u8).take(zero_run));
            let mut vb = Vecbuf::new();
            write_record_block(&mut vb, &payload, CompressionType::Auto, 3, ChecksumType::Adler32);
            vb.seek(0);
            prop_assert_eq!(read_record_block(&mut vb, ChecksumType::Adler32, true).unwrap(), payload);
        }
    }
}
