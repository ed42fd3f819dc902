//! The open-file session: header, seek index, current record and the write
//! path.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::{debug, warn};

use crate::catalog::{Catalog, FieldDescriptor, HeaderVisitor};
use crate::config::XcdfConfig;
use crate::engine::buf::{AppendBuf, ReadBuf};
use crate::engine::codec;
use crate::engine::filebuf::FileBuf;
use crate::engine::mmapbuf::MmapBuf;
use crate::engine::vecbuf::Vecbuf;
use crate::error::{Result, XcdfError};
use crate::iter::{FieldIter, RecordIter};
use crate::select::FieldsByNameSelector;
use crate::types::{ChecksumType, FieldData, FieldType, Value};
use crate::visitor::{FieldVisitor, Tuple, TupleSetter};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileMode {
    Read,
    Write,
}

impl FromStr for FileMode {
    type Err = XcdfError;

    fn from_str(s: &str) -> Result<FileMode> {
        match s {
            "r" | "R" => Ok(FileMode::Read),
            "w" | "W" => Ok(FileMode::Write),
            _ => Err(XcdfError::InvalidMode(s.to_owned())),
        }
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FileMode::Read => "r",
            FileMode::Write => "w",
        })
    }
}

struct Reader {
    buf: MmapBuf,
    checksum: ChecksumType,
    offsets: Vec<usize>,
    next: usize,
    current: Option<u64>,
}

struct Writer {
    buf: FileBuf,
    header_written: bool,
    offsets: Vec<u64>,
    payload: Vecbuf,
}

enum State {
    Read(Reader),
    Write(Writer),
    Closed,
}

/// One open XCDF file, in either read or write mode.
///
/// In read mode the handle owns a cursor over the physical records; at most
/// one traversal can hold it at a time. In write mode fields are declared
/// with `add_field`, values staged with `set_field`/`push_value` and records
/// appended with `write_record`.
pub struct XcdfFile {
    path: PathBuf,
    mode: FileMode,
    config: XcdfConfig,
    catalog: Catalog,
    values: Vec<FieldData>,
    state: State,
}

impl XcdfFile {
    pub fn open<P: AsRef<Path>>(path: P, mode: FileMode) -> Result<XcdfFile> {
        XcdfFile::open_with_config(path, mode, XcdfConfig::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(path: P, mode: FileMode, config: XcdfConfig) -> Result<XcdfFile> {
        let path = path.as_ref().to_path_buf();
        let (catalog, state) = match mode {
            FileMode::Read => {
                let (catalog, reader) = open_reader(&path)?;
                (catalog, State::Read(reader))
            }
            FileMode::Write => {
                let f = File::create(&path)?;
                let writer = Writer {
                    buf: FileBuf::new(f, config.write_buffer),
                    header_written: false,
                    offsets: Vec::new(),
                    payload: Vecbuf::new(),
                };
                (Catalog::new(), State::Write(writer))
            }
        };
        debug!(path = %path.display(), %mode, fields = catalog.len(), "opened xcdf file");

        Ok(XcdfFile {
            values: catalog.empty_values(),
            path,
            mode,
            config,
            catalog,
            state,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> FileMode {
        self.mode
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.state, State::Closed)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            State::Closed => Err(XcdfError::NotOpen),
            _ => Ok(()),
        }
    }

    pub(crate) fn ensure_read(&self) -> Result<()> {
        match self.state {
            State::Read(_) => Ok(()),
            State::Write(_) => Err(XcdfError::WrongMode { expected: "read" }),
            State::Closed => Err(XcdfError::NotOpen),
        }
    }

    fn writer(&mut self) -> Result<&mut Writer> {
        match &mut self.state {
            State::Write(w) => Ok(w),
            State::Read(_) => Err(XcdfError::WrongMode { expected: "write" }),
            State::Closed => Err(XcdfError::NotOpen),
        }
    }

    pub fn record_count(&self) -> Result<u64> {
        match &self.state {
            State::Read(r) => Ok(r.offsets.len() as u64),
            State::Write(w) => Ok(w.offsets.len() as u64),
            State::Closed => Err(XcdfError::NotOpen),
        }
    }

    pub fn field_count(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.catalog.len())
    }

    /// Text dump of the catalog, readable by `Catalog::parse_string`.
    pub fn header(&self) -> Result<String> {
        let mut out = format!(
            "# xcdf version {}\n# records {}\n",
            codec::VERSION,
            self.record_count()?
        );
        let mut hv = HeaderVisitor::new(&mut out);
        self.apply_field_visitor(&mut hv)?;
        Ok(out)
    }

    /// Visits every field of the current record in catalog order.
    pub fn apply_field_visitor<V: FieldVisitor + ?Sized>(&self, visitor: &mut V) -> Result<()> {
        self.ensure_open()?;
        for (field, data) in self.catalog.fields().iter().zip(self.values.iter()) {
            visitor.visit(field, data)?;
        }
        Ok(())
    }

    /// Values of the current record, in catalog order.
    pub fn current_values(&self) -> &[FieldData] {
        &self.values
    }

    /// Number of the record last read, if any.
    pub fn current_record(&self) -> Option<u64> {
        match &self.state {
            State::Read(r) => r.current,
            _ => None,
        }
    }

    /// Tuple for the current record: every field, or the selected ones.
    pub fn current_tuple(&self, selector: Option<&FieldsByNameSelector>) -> Result<Tuple> {
        match selector {
            Some(sel) => sel.get_tuple(&self.catalog, &self.values),
            None => {
                let mut setter = TupleSetter::new(self.catalog.len());
                self.apply_field_visitor(&mut setter)?;
                Ok(setter.into_tuple())
            }
        }
    }

    /// Reads the next physical record. Returns `Ok(false)` past the last one.
    pub fn read(&mut self) -> Result<bool> {
        let XcdfFile {
            state,
            catalog,
            values,
            config,
            ..
        } = self;
        let r = match state {
            State::Read(r) => r,
            State::Write(_) => return Err(XcdfError::WrongMode { expected: "read" }),
            State::Closed => return Err(XcdfError::NotOpen),
        };
        let id = r.next;
        let offset = match r.offsets.get(id) {
            Some(off) => *off,
            None => return Ok(false),
        };

        let record = id as u64;
        r.buf.seek(offset);
        let payload = codec::read_record_block(&mut r.buf, r.checksum, config.verify_checksums)
            .map_err(|source| XcdfError::CorruptRecord { record, source })?;
        codec::decode_record(catalog, payload, values)
            .map_err(|source| XcdfError::CorruptRecord { record, source })?;

        r.current = Some(record);
        r.next = id + 1;
        Ok(true)
    }

    /// Positions on record `id` and reads it. Returns `Ok(false)` when no
    /// such record exists.
    pub fn seek(&mut self, id: u64) -> Result<bool> {
        self.ensure_read()?;
        if id >= self.record_count()? {
            debug!(id, "seek past last record");
            return Ok(false);
        }
        if let State::Read(r) = &mut self.state {
            r.next = id as usize;
        }
        debug!(id, "seek");
        self.read()
    }

    /// Returns to the start of the file. No-op outside read mode.
    pub fn rewind(&mut self) {
        if let State::Read(r) = &mut self.state {
            r.next = 0;
            r.current = None;
            for v in self.values.iter_mut() {
                v.clear();
            }
        }
    }

    /// Iterates the records accepted by `select`, as tuples of every field or
    /// of the comma-separated `fields`.
    pub fn records(&mut self, select: &str, fields: Option<&str>) -> Result<RecordIter<'_>> {
        RecordIter::new(self, Some(select), fields)
    }

    pub fn all_records(&mut self) -> Result<RecordIter<'_>> {
        RecordIter::new(self, None, None)
    }

    pub fn fields(&mut self, names: &str) -> Result<FieldIter<'_>> {
        FieldIter::new(self, names)
    }

    /// Fetches record `id` and rewinds the file afterwards.
    pub fn get_record(&mut self, id: u64, fields: Option<&str>) -> Result<Tuple> {
        self.ensure_read()?;
        let selector = match fields {
            Some(list) => Some(FieldsByNameSelector::new(list, &self.catalog)?),
            None => None,
        };
        if !self.seek(id)? {
            return Err(XcdfError::InvalidRecord(id));
        }
        let tuple = self.current_tuple(selector.as_ref());
        self.rewind();
        tuple
    }

    /// Declares a new field. `type_tag` is 0 (unsigned), 1 (signed) or 2
    /// (float); any other tag leaves the catalog alone and returns false.
    pub fn add_field(&mut self, name: &str, type_tag: i64, resolution: Value, parent: Option<&str>) -> Result<bool> {
        let w = self.writer()?;
        let ftype = match FieldType::from_tag(type_tag) {
            Some(t) => t,
            None => return Ok(false),
        };
        if w.header_written {
            return Err(XcdfError::CatalogFrozen(name.to_owned()));
        }
        self.catalog
            .add(FieldDescriptor::new(name, ftype, resolution, parent))?;
        self.values.push(FieldData::empty(ftype));
        debug!(name, %ftype, %resolution, "added field");
        Ok(true)
    }

    pub fn add_unsigned_field(&mut self, name: &str, resolution: u64, parent: Option<&str>) -> Result<()> {
        let tag = FieldType::UnsignedInteger.tag();
        self.add_field(name, tag, Value::Unsigned(resolution), parent)
            .map(|_| ())
    }

    pub fn add_signed_field(&mut self, name: &str, resolution: i64, parent: Option<&str>) -> Result<()> {
        let tag = FieldType::SignedInteger.tag();
        self.add_field(name, tag, Value::Signed(resolution), parent)
            .map(|_| ())
    }

    pub fn add_float_field(&mut self, name: &str, resolution: f64, parent: Option<&str>) -> Result<()> {
        let tag = FieldType::FloatingPoint.tag();
        self.add_field(name, tag, Value::Float(resolution), parent)
            .map(|_| ())
    }

    fn staged(&mut self, name: &str) -> Result<&mut FieldData> {
        self.writer()?;
        let n = self
            .catalog
            .index_of(name)
            .ok_or_else(|| XcdfError::UnknownField(name.to_owned()))?;
        Ok(&mut self.values[n])
    }

    /// Replaces the pending values of `name` for the next record.
    pub fn set_field(&mut self, name: &str, values: &[Value]) -> Result<()> {
        let data = self.staged(name)?;
        data.clear();
        for v in values {
            data.push(*v);
        }
        Ok(())
    }

    pub fn push_value(&mut self, name: &str, value: Value) -> Result<()> {
        self.staged(name)?.push(value);
        Ok(())
    }

    /// Appends the pending values as a new record and returns its number.
    pub fn write_record(&mut self) -> Result<u64> {
        let XcdfFile {
            state,
            catalog,
            values,
            config,
            ..
        } = self;
        let w = match state {
            State::Write(w) => w,
            State::Read(_) => return Err(XcdfError::WrongMode { expected: "write" }),
            State::Closed => return Err(XcdfError::NotOpen),
        };

        for n in 0..catalog.len() {
            if let Some(p) = catalog.parent_index(n) {
                let expected = match values[p].get(0) {
                    Some(v) if values[p].len() == 1 => v.as_u64() as usize,
                    _ => 0,
                };
                if values[n].len() != expected {
                    return Err(XcdfError::VectorLength {
                        field: catalog.field(n).name.clone(),
                        parent: catalog.field(p).name.clone(),
                        expected,
                        found: values[n].len(),
                    });
                }
            }
        }

        if !w.header_written {
            codec::write_header(&mut w.buf, catalog, config.checksum);
            w.header_written = true;
        }
        let offset = w.buf.position();
        w.payload.reset();
        codec::encode_record(catalog, values, &mut w.payload);
        codec::write_record_block(
            &mut w.buf,
            w.payload.as_slice(),
            config.compression,
            config.zstd_level,
            config.checksum,
        );
        if let Some(e) = w.buf.take_error() {
            return Err(XcdfError::Io(e));
        }
        w.offsets.push(offset);
        for v in values.iter_mut() {
            v.clear();
        }
        Ok(w.offsets.len() as u64 - 1)
    }

    /// Finishes the file. In write mode this writes the header if no record
    /// was written, the seek index and the footer.
    pub fn close(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Closed) {
            State::Closed => Err(XcdfError::NotOpen),
            State::Read(_) => {
                debug!(path = %self.path.display(), "closed xcdf file");
                Ok(())
            }
            State::Write(mut w) => {
                if !w.header_written {
                    codec::write_header(&mut w.buf, &self.catalog, self.config.checksum);
                }
                let trailer_offset = w.buf.position();
                codec::write_trailer(&mut w.buf, &w.offsets, trailer_offset);
                w.buf.flush()?;
                debug!(
                    path = %self.path.display(),
                    records = w.offsets.len(),
                    "closed xcdf file"
                );
                Ok(())
            }
        }
    }
}

impl Drop for XcdfFile {
    fn drop(&mut self) {
        if let State::Write(_) = self.state {
            if let Err(e) = self.close() {
                warn!(path = %self.path.display(), error = %e, "failed to close xcdf file");
            }
        }
    }
}

fn open_reader(path: &Path) -> Result<(Catalog, Reader)> {
    let f = File::open(path)?;
    if f.metadata()?.len() == 0 {
        return Err(XcdfError::EmptyFile(path.display().to_string()));
    }
    let mut buf = MmapBuf::new(&f)?;
    let (catalog, checksum) = codec::read_header(&mut buf)?;
    let data_start = buf.pos();
    let len = buf.len();

    let offsets = match codec::read_trailer(&mut buf, len, data_start)? {
        Some(offsets) => offsets,
        None => {
            let offsets = codec::scan_records(&mut buf, data_start, checksum);
            warn!(
                path = %path.display(),
                records = offsets.len(),
                "no seek index found, rebuilt by scanning"
            );
            offsets
        }
    };

    let reader = Reader {
        buf,
        checksum,
        offsets,
        next: 0,
        current: None,
    };
    Ok((catalog, reader))
}
