//! C interface to xcdf.
//!
//! Handles are opaque pointers owned by the caller and released with the
//! matching `_close`/`_free` call. Functions that can fail take an optional
//! `err`/`errlen` buffer which receives a NUL terminated message.

use std::cmp::min;
use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::ptr;

extern crate libc;
use libc::{c_void, memcpy};
use tracing::debug;

extern crate xcdf;
use xcdf::{Datum, FileMode, RecordCursor, Tuple, Value, XcdfError, XcdfFile};

/// Record traversal over an open file. The file must outlive the cursor.
pub struct XcdfRecords {
    file: *mut XcdfFile,
    cursor: RecordCursor,
    tuple: Option<Tuple>,
}

fn copy_out(s: &str, out: *mut c_char, size: usize) {
    if out.is_null() || size == 0 {
        return;
    }
    let bytes = s.as_bytes();
    let n = min(size - 1, bytes.len());
    unsafe {
        memcpy(out as *mut c_void, bytes.as_ptr() as *const c_void, n);
        *out.add(n) = 0;
    }
}

fn set_error(err: *mut c_char, errlen: usize, e: &XcdfError) {
    debug!(error = %e, "xcdf c call failed");
    copy_out(&e.to_string(), err, errlen);
}

fn c_str<'a>(s: *const c_char) -> Result<Option<&'a str>, XcdfError> {
    if s.is_null() {
        return Ok(None);
    }
    unsafe { CStr::from_ptr(s) }
        .to_str()
        .map(Some)
        .map_err(|_| XcdfError::InvalidArgument("string is not valid utf-8".to_owned()))
}

fn required<'a>(s: *const c_char) -> Result<&'a str, XcdfError> {
    c_str(s)?.ok_or_else(|| XcdfError::InvalidArgument("NULL string".to_owned()))
}

fn file<'a>(h: *mut XcdfFile) -> Result<&'a mut XcdfFile, XcdfError> {
    unsafe { h.as_mut() }.ok_or(XcdfError::NotOpen)
}

#[no_mangle]
pub extern "C" fn xcdf_open(path: *const c_char, mode: *const c_char, err: *mut c_char, errlen: usize) -> *mut XcdfFile {
    let opened = required(path).and_then(|p| {
        let mode: FileMode = required(mode)?.parse()?;
        XcdfFile::open(p, mode)
    });
    match opened {
        Ok(f) => Box::into_raw(Box::new(f)),
        Err(e) => {
            set_error(err, errlen, &e);
            ptr::null_mut()
        }
    }
}

/// Closes and frees the handle. Returns 0, or -1 when finishing the file
/// failed; the handle is freed either way.
#[no_mangle]
pub extern "C" fn xcdf_close(h: *mut XcdfFile, err: *mut c_char, errlen: usize) -> c_int {
    if h.is_null() {
        return 0;
    }
    let mut f = unsafe { Box::from_raw(h) };
    if !f.is_open() {
        return 0;
    }
    match f.close() {
        Ok(()) => 0,
        Err(e) => {
            set_error(err, errlen, &e);
            -1
        }
    }
}

#[no_mangle]
pub extern "C" fn xcdf_record_count(h: *mut XcdfFile) -> i64 {
    match file(h).and_then(|f| f.record_count()) {
        Ok(n) => n as i64,
        Err(_) => -1,
    }
}

#[no_mangle]
pub extern "C" fn xcdf_field_count(h: *mut XcdfFile) -> c_int {
    match file(h).and_then(|f| f.field_count()) {
        Ok(n) => n as c_int,
        Err(_) => -1,
    }
}

/// Copies the header dump into `out` and returns its full length, or -1.
#[no_mangle]
pub extern "C" fn xcdf_header(h: *mut XcdfFile, out: *mut c_char, size: usize) -> i64 {
    match file(h).and_then(|f| f.header()) {
        Ok(text) => {
            copy_out(&text, out, size);
            text.len() as i64
        }
        Err(_) => -1,
    }
}

/// Returns 1 when the field was added, 0 for an unknown type tag and -1 on
/// error. `parent` may be NULL.
#[no_mangle]
pub extern "C" fn xcdf_add_field(
    h: *mut XcdfFile,
    name: *const c_char,
    type_tag: c_int,
    resolution: f64,
    parent: *const c_char,
    err: *mut c_char,
    errlen: usize,
) -> c_int {
    let added = (|| {
        let f = file(h)?;
        let name = required(name)?;
        let parent = c_str(parent)?;
        f.add_field(name, type_tag as i64, Value::Float(resolution), parent)
    })();
    match added {
        Ok(true) => 1,
        Ok(false) => 0,
        Err(e) => {
            set_error(err, errlen, &e);
            -1
        }
    }
}

fn push(h: *mut XcdfFile, name: *const c_char, value: Value) -> c_int {
    match file(h).and_then(|f| f.push_value(required(name)?, value)) {
        Ok(()) => 0,
        Err(e) => {
            debug!(error = %e, "xcdf push failed");
            -1
        }
    }
}

#[no_mangle]
pub extern "C" fn xcdf_push_u64(h: *mut XcdfFile, name: *const c_char, value: u64) -> c_int {
    push(h, name, Value::Unsigned(value))
}

#[no_mangle]
pub extern "C" fn xcdf_push_i64(h: *mut XcdfFile, name: *const c_char, value: i64) -> c_int {
    push(h, name, Value::Signed(value))
}

#[no_mangle]
pub extern "C" fn xcdf_push_f64(h: *mut XcdfFile, name: *const c_char, value: f64) -> c_int {
    push(h, name, Value::Float(value))
}

/// Returns the new record number, or -1.
#[no_mangle]
pub extern "C" fn xcdf_write_record(h: *mut XcdfFile, err: *mut c_char, errlen: usize) -> i64 {
    match file(h).and_then(|f| f.write_record()) {
        Ok(id) => id as i64,
        Err(e) => {
            set_error(err, errlen, &e);
            -1
        }
    }
}

/// Fetches one record as a tuple to be released with `xcdf_tuple_free`.
/// `fields` may be NULL for every field.
#[no_mangle]
pub extern "C" fn xcdf_get_record(
    h: *mut XcdfFile,
    id: u64,
    fields: *const c_char,
    err: *mut c_char,
    errlen: usize,
) -> *mut Tuple {
    match file(h).and_then(|f| f.get_record(id, c_str(fields)?)) {
        Ok(t) => Box::into_raw(Box::new(t)),
        Err(e) => {
            set_error(err, errlen, &e);
            ptr::null_mut()
        }
    }
}

#[no_mangle]
pub extern "C" fn xcdf_tuple_free(t: *mut Tuple) {
    if !t.is_null() {
        drop(unsafe { Box::from_raw(t) });
    }
}

fn datum<'a>(t: *const Tuple, index: usize) -> Option<&'a Datum> {
    unsafe { t.as_ref() }.and_then(|t| t.get(index))
}

/// Number of values in slot `index`: 0 for a missing field, -1 for a bad
/// slot.
#[no_mangle]
pub extern "C" fn xcdf_tuple_len(t: *const Tuple, index: usize) -> i64 {
    datum(t, index).map_or(-1, |d| d.len() as i64)
}

/// 1 when slot `index` holds a list (vector field), 0 for a scalar or a
/// missing value.
#[no_mangle]
pub extern "C" fn xcdf_tuple_is_vector(t: *const Tuple, index: usize) -> c_int {
    datum(t, index).map_or(0, |d| d.as_vector().is_some() as c_int)
}

#[no_mangle]
pub extern "C" fn xcdf_tuple_get_u64(t: *const Tuple, index: usize, element: usize) -> u64 {
    datum(t, index).and_then(|d| d.get(element)).map_or(0, |v| v.as_u64())
}

#[no_mangle]
pub extern "C" fn xcdf_tuple_get_i64(t: *const Tuple, index: usize, element: usize) -> i64 {
    datum(t, index).and_then(|d| d.get(element)).map_or(0, |v| v.as_i64())
}

#[no_mangle]
pub extern "C" fn xcdf_tuple_get_f64(t: *const Tuple, index: usize, element: usize) -> f64 {
    datum(t, index).and_then(|d| d.get(element)).map_or(f64::NAN, |v| v.as_f64())
}

/// Starts a traversal. `select` defaults to every record and `fields` to
/// every field when NULL.
#[no_mangle]
pub extern "C" fn xcdf_records_open(
    h: *mut XcdfFile,
    select: *const c_char,
    fields: *const c_char,
    err: *mut c_char,
    errlen: usize,
) -> *mut XcdfRecords {
    let cursor = file(h).and_then(|f| RecordCursor::new(f, c_str(select)?, c_str(fields)?));
    match cursor {
        Ok(cursor) => Box::into_raw(Box::new(XcdfRecords {
            file: h,
            cursor,
            tuple: None,
        })),
        Err(e) => {
            set_error(err, errlen, &e);
            ptr::null_mut()
        }
    }
}

/// Advances to the next accepted record: 1 on a record, 0 at the end, -1 on
/// error.
#[no_mangle]
pub extern "C" fn xcdf_records_next(r: *mut XcdfRecords, err: *mut c_char, errlen: usize) -> c_int {
    let r = match unsafe { r.as_mut() } {
        Some(r) => r,
        None => return -1,
    };
    let f = match file(r.file) {
        Ok(f) => f,
        Err(e) => {
            set_error(err, errlen, &e);
            return -1;
        }
    };
    r.tuple = None;
    match r.cursor.advance(f) {
        Some(Ok(t)) => {
            r.tuple = Some(t);
            1
        }
        Some(Err(e)) => {
            set_error(err, errlen, &e);
            -1
        }
        None => 0,
    }
}

/// Tuple of the current record, valid until the next `xcdf_records_next`.
#[no_mangle]
pub extern "C" fn xcdf_records_tuple(r: *const XcdfRecords) -> *const Tuple {
    unsafe { r.as_ref() }
        .and_then(|r| r.tuple.as_ref())
        .map_or(ptr::null(), |t| t as *const Tuple)
}

#[no_mangle]
pub extern "C" fn xcdf_records_close(r: *mut XcdfRecords) {
    if !r.is_null() {
        drop(unsafe { Box::from_raw(r) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    fn cs(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    #[test]
    fn test_write_then_filter() {
        let dir = tempfile::tempdir().unwrap();
        let path = cs(dir.path().join("c.xcd").to_str().unwrap());
        let mut err = [0 as c_char; 256];
        let (a, b, n, v) = (cs("a"), cs("b"), cs("n"), cs("v"));

        let w = xcdf_open(path.as_ptr(), cs("w").as_ptr(), err.as_mut_ptr(), err.len());
        assert!(!w.is_null());
        assert_eq!(xcdf_add_field(w, a.as_ptr(), 0, 1.0, ptr::null(), err.as_mut_ptr(), err.len()), 1);
        assert_eq!(xcdf_add_field(w, b.as_ptr(), 2, 0.0, ptr::null(), err.as_mut_ptr(), err.len()), 1);
        assert_eq!(xcdf_add_field(w, n.as_ptr(), 0, 1.0, ptr::null(), err.as_mut_ptr(), err.len()), 1);
        assert_eq!(xcdf_add_field(w, v.as_ptr(), 1, 1.0, n.as_ptr(), err.as_mut_ptr(), err.len()), 1);
        assert_eq!(xcdf_add_field(w, cs("z").as_ptr(), 9, 1.0, ptr::null(), err.as_mut_ptr(), err.len()), 0);
        for i in 0..3u64 {
            assert_eq!(xcdf_push_u64(w, a.as_ptr(), i), 0);
            assert_eq!(xcdf_push_f64(w, b.as_ptr(), i as f64 / 2.0), 0);
            assert_eq!(xcdf_push_u64(w, n.as_ptr(), i), 0);
            for k in 0..i {
                assert_eq!(xcdf_push_i64(w, v.as_ptr(), -(k as i64)), 0);
            }
            assert_eq!(xcdf_write_record(w, err.as_mut_ptr(), err.len()), i as i64);
        }
        assert_eq!(xcdf_close(w, err.as_mut_ptr(), err.len()), 0);

        let r = xcdf_open(path.as_ptr(), cs("r").as_ptr(), err.as_mut_ptr(), err.len());
        assert!(!r.is_null());
        assert_eq!(xcdf_record_count(r), 3);
        assert_eq!(xcdf_field_count(r), 4);

        let recs = xcdf_records_open(r, cs("a>0").as_ptr(), cs("b,v").as_ptr(), err.as_mut_ptr(), err.len());
        assert!(!recs.is_null());
        assert_eq!(xcdf_records_next(recs, err.as_mut_ptr(), err.len()), 1);
        let t = xcdf_records_tuple(recs);
        assert_eq!(xcdf_tuple_get_f64(t, 0, 0), 0.5);
        assert_eq!(xcdf_tuple_len(t, 1), 1);
        assert_eq!(xcdf_tuple_is_vector(t, 1), 1);
        assert_eq!(xcdf_records_next(recs, err.as_mut_ptr(), err.len()), 1);
        let t = xcdf_records_tuple(recs);
        assert_eq!(xcdf_tuple_get_i64(t, 1, 1), -1);
        assert_eq!(xcdf_records_next(recs, err.as_mut_ptr(), err.len()), 0);
        xcdf_records_close(recs);

        let t = xcdf_get_record(r, 0, ptr::null(), err.as_mut_ptr(), err.len());
        assert!(!t.is_null());
        assert_eq!(xcdf_tuple_len(t, 3), 0);
        assert_eq!(xcdf_tuple_get_u64(t, 2, 0), 0);
        xcdf_tuple_free(t);

        let t = xcdf_get_record(r, 7, ptr::null(), err.as_mut_ptr(), err.len());
        assert!(t.is_null());
        let msg = unsafe { CStr::from_ptr(err.as_ptr()) }.to_str().unwrap();
        assert_eq!(msg, "Invalid event number 7");

        let mut header = [0 as c_char; 512];
        let len = xcdf_header(r, header.as_mut_ptr(), header.len());
        assert!(len > 0 && (len as usize) < header.len());
        assert_eq!(xcdf_close(r, err.as_mut_ptr(), err.len()), 0);
    }

    #[test]
    fn test_open_errors_are_reported() {
        let mut err = [0 as c_char; 64];
        let h = xcdf_open(cs("/nonexistent/x.xcd").as_ptr(), cs("q").as_ptr(), err.as_mut_ptr(), err.len());
        assert!(h.is_null());
        let msg = unsafe { CStr::from_ptr(err.as_ptr()) }.to_str().unwrap();
        assert_eq!(msg, "invalid file mode 'q'");
    }

    #[test]
    fn test_bad_string_arguments() {
        let mut err = [0 as c_char; 64];
        let path = CString::new(vec![b'x', 0xff, 0xfe]).unwrap();
        let h = xcdf_open(path.as_ptr(), cs("r").as_ptr(), err.as_mut_ptr(), err.len());
        assert!(h.is_null());
        let msg = unsafe { CStr::from_ptr(err.as_ptr()) }.to_str().unwrap();
        assert_eq!(msg, "invalid argument: string is not valid utf-8");

        let h = xcdf_open(ptr::null(), cs("r").as_ptr(), err.as_mut_ptr(), err.len());
        assert!(h.is_null());
        let msg = unsafe { CStr::from_ptr(err.as_ptr()) }.to_str().unwrap();
        assert_eq!(msg, "invalid argument: NULL string");
    }
}
