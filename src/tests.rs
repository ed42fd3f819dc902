use std::fs;
use std::path::Path;

use proptest::prelude::*;

use crate::catalog::Catalog;
use crate::config::XcdfConfig;
use crate::engine::codec::FOOTER_LEN;
use crate::error::{ErrorKind, XcdfError};
use crate::file::{FileMode, XcdfFile};
use crate::types::{ChecksumType, CompressionType, Datum, FieldType, Value};
use crate::visitor::Tuple;

// a = [0, 1, 2], b = [0.5, 1.5, 2.5], n = [2, 0, 1], hits follow n
fn write_sample(path: &Path, config: XcdfConfig) {
    let mut f = XcdfFile::open_with_config(path, FileMode::Write, config).unwrap();
    f.add_unsigned_field("a", 1, None).unwrap();
    f.add_float_field("b", 0.5, None).unwrap();
    f.add_unsigned_field("n", 1, None).unwrap();
    f.add_signed_field("hit.t", 1, Some("n")).unwrap();

    let hits: [&[i64]; 3] = [&[-4, 7], &[], &[12]];
    for (i, t) in hits.iter().enumerate() {
        f.set_field("a", &[Value::Unsigned(i as u64)]).unwrap();
        f.set_field("b", &[Value::Float(i as f64 + 0.5)]).unwrap();
        f.push_value("n", Value::Unsigned(t.len() as u64)).unwrap();
        for x in t.iter() {
            f.push_value("hit.t", Value::Signed(*x)).unwrap();
        }
        f.write_record().unwrap();
    }
    f.close().unwrap();
}

fn sample(name: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    write_sample(&path, XcdfConfig::default());
    (dir, path)
}

fn collect(iter: impl Iterator<Item = crate::error::Result<Tuple>>) -> Vec<Tuple> {
    iter.map(|t| t.unwrap()).collect()
}

#[test]
fn test_full_and_named_iteration_agree() {
    let (_dir, path) = sample("agree.xcd");
    let mut f = XcdfFile::open(&path, FileMode::Read).unwrap();

    let full = collect(f.all_records().unwrap());
    let named = collect(f.fields("a,b,n,hit.t").unwrap());
    let filtered_named = collect(f.records("true", Some("a, b, n, hit.t")).unwrap());

    assert_eq!(full.len(), 3);
    assert_eq!(full, named);
    assert_eq!(full, filtered_named);
    assert_eq!(full[0][3], Datum::Vector(vec![Value::Signed(-4), Value::Signed(7)]));
    assert_eq!(full[2][3], Datum::Vector(vec![Value::Signed(12)]));
}

#[test]
fn test_missing_differs_from_zero() {
    let (_dir, path) = sample("missing.xcd");
    let mut f = XcdfFile::open(&path, FileMode::Read).unwrap();
    let t = f.get_record(1, Some("n,hit.t")).unwrap();
    assert_eq!(t[0], Datum::Scalar(Value::Unsigned(0)));
    assert_eq!(t[1], Datum::Missing);

    let t = f.get_record(0, Some("a")).unwrap();
    assert_eq!(t[0], Datum::Scalar(Value::Unsigned(0)));
}

#[test]
fn test_filter_example() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("filter.xcd");
    {
        let mut f = XcdfFile::open(&path, FileMode::Write).unwrap();
        assert!(f.add_field("a", 0, Value::Unsigned(1), None).unwrap());
        assert!(f.add_field("b", 2, Value::Float(0.0), None).unwrap());
        for a in 0..3u64 {
            f.push_value("a", Value::Unsigned(a)).unwrap();
            f.push_value("b", Value::Float(a as f64 * 10.0)).unwrap();
            f.write_record().unwrap();
        }
    }

    let mut f = XcdfFile::open(&path, FileMode::Read).unwrap();
    let got = collect(f.records("a>0", None).unwrap());
    assert_eq!(got.len(), 2);
    assert_eq!(got[0][0], Datum::Scalar(Value::Unsigned(1)));
    assert_eq!(got[0][1], Datum::Scalar(Value::Float(10.0)));
    assert_eq!(got[1][0], Datum::Scalar(Value::Unsigned(2)));
}

#[test]
fn test_iteration_accounts_for_every_record() {
    let (_dir, path) = sample("count.xcd");
    let mut f = XcdfFile::open(&path, FileMode::Read).unwrap();
    let total = f.record_count().unwrap() as usize;

    let selected = collect(f.records("hit.t > 0", Some("a")).unwrap());
    let rejected = collect(f.records("!(hit.t > 0)", Some("a")).unwrap());
    // record 1 has no hits, so neither expression accepts it
    assert_eq!(selected.len(), 2);
    assert_eq!(rejected.len(), 1);

    let yielded = collect(f.records("b > 1", None).unwrap()).len();
    let filtered = collect(f.records("!(b > 1)", None).unwrap()).len();
    assert_eq!(yielded + filtered, total);

    // exhausted traversals leave the file at its start
    assert_eq!(f.current_record(), None);
    assert!(f.read().unwrap());
    assert_eq!(f.current_record(), Some(0));
}

#[test]
fn test_exhausted_cursor_stays_exhausted() {
    let (_dir, path) = sample("fused.xcd");
    let mut f = XcdfFile::open(&path, FileMode::Read).unwrap();
    let mut it = f.records("a == 2", None).unwrap();
    assert!(it.next().is_some());
    assert!(it.next().is_none());
    assert!(it.next().is_none());
}

#[test]
fn test_random_access_rewinds() {
    let (_dir, path) = sample("random.xcd");
    let mut f = XcdfFile::open(&path, FileMode::Read).unwrap();

    let t = f.get_record(2, None).unwrap();
    assert_eq!(t[0], Datum::Scalar(Value::Unsigned(2)));
    assert_eq!(t[1], Datum::Scalar(Value::Float(2.5)));

    let all = collect(f.fields("a").unwrap());
    let firsts: Vec<Datum> = all.into_iter().map(|t| t[0].clone()).collect();
    assert_eq!(
        firsts,
        vec![
            Datum::Scalar(Value::Unsigned(0)),
            Datum::Scalar(Value::Unsigned(1)),
            Datum::Scalar(Value::Unsigned(2)),
        ]
    );

    match f.get_record(3, None) {
        Err(e @ XcdfError::InvalidRecord(3)) => {
            assert_eq!(e.kind(), ErrorKind::Engine);
            assert_eq!(e.to_string(), "Invalid event number 3");
        }
        other => panic!("unexpected {:?}", other),
    }
    // bad field lists fail before the seek is attempted
    assert!(matches!(f.get_record(3, Some("zz")), Err(XcdfError::UnknownField(_))));
}

#[test]
fn test_bad_selectors_fail_before_reading() {
    let (_dir, path) = sample("selectors.xcd");
    let mut f = XcdfFile::open(&path, FileMode::Read).unwrap();

    let check = |err: Option<XcdfError>| {
        let err = err.unwrap();
        assert_eq!(err.kind(), ErrorKind::Configuration, "{:?}", err);
    };
    check(f.records("true", Some("a,nope")).err());
    check(f.records("nope > 1", None).err());
    check(f.records("a >", None).err());
    check(f.fields("a,,b").err());
    assert_eq!(f.current_record(), None);
}

#[test]
fn test_catalog_survives_reopen() {
    let (_dir, path) = sample("reopen.xcd");
    let f = XcdfFile::open(&path, FileMode::Read).unwrap();
    let c = f.catalog();
    assert_eq!(f.field_count().unwrap(), 4);
    assert_eq!(c.field(0).ftype, FieldType::UnsignedInteger);
    assert_eq!(c.field(1).resolution, Value::Float(0.5));
    assert_eq!(c.field(3).name, "hit.t");
    assert_eq!(c.field(3).ftype, FieldType::SignedInteger);
    assert_eq!(c.field(3).parent.as_deref(), Some("n"));
}

#[test]
fn test_header_dump_round_trips() {
    let (_dir, path) = sample("header.xcd");
    let f = XcdfFile::open(&path, FileMode::Read).unwrap();
    let text = f.header().unwrap();
    assert!(text.starts_with("# xcdf version 3\n# records 3\n"));
    assert!(text.contains("field hit.t int 1 n\n"));
    let parsed = Catalog::parse_string(&text).unwrap();
    assert_eq!(parsed.fields(), f.catalog().fields());
}

#[test]
fn test_compression_choices_read_back() {
    let dir = tempfile::tempdir().unwrap();
    let reference = {
        let path = dir.path().join("ref.xcd");
        write_sample(&path, XcdfConfig::default());
        let mut f = XcdfFile::open(&path, FileMode::Read).unwrap();
        collect(f.all_records().unwrap())
    };
    for (i, compression) in [CompressionType::None, CompressionType::Lz4, CompressionType::Zstd]
        .iter()
        .enumerate()
    {
        let path = dir.path().join(format!("c{}.xcd", i));
        let config = XcdfConfig::default()
            .with_compression(*compression)
            .with_checksum(ChecksumType::None)
            .with_write_buffer(7);
        write_sample(&path, config);
        let mut f = XcdfFile::open(&path, FileMode::Read).unwrap();
        assert_eq!(collect(f.all_records().unwrap()), reference);
    }
}

#[test]
fn test_corrupt_record_is_an_engine_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.xcd");
    write_sample(&path, XcdfConfig::default().with_compression(CompressionType::None));

    let mut bytes = fs::read(&path).unwrap();
    let needle = 1.5f64.to_le_bytes();
    let at = bytes
        .windows(needle.len())
        .position(|w| w == needle)
        .unwrap();
    bytes[at] ^= 0x01;
    fs::write(&path, &bytes).unwrap();

    let mut f = XcdfFile::open(&path, FileMode::Read).unwrap();
    let results: Vec<_> = f.all_records().unwrap().collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    match &results[1] {
        Err(e @ XcdfError::CorruptRecord { record: 1, .. }) => assert_eq!(e.kind(), ErrorKind::Engine),
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(f.current_record(), None);

    // without verification the damaged value comes through
    let mut f = XcdfFile::open_with_config(
        &path,
        FileMode::Read,
        XcdfConfig::default().with_verify_checksums(false),
    )
    .unwrap();
    assert_eq!(collect(f.all_records().unwrap()).len(), 3);
}

#[test]
fn test_missing_footer_is_rebuilt() {
    let (_dir, path) = sample("nofooter.xcd");
    let mut bytes = fs::read(&path).unwrap();
    bytes.truncate(bytes.len() - FOOTER_LEN);
    fs::write(&path, &bytes).unwrap();

    let mut f = XcdfFile::open(&path, FileMode::Read).unwrap();
    assert_eq!(f.record_count().unwrap(), 3);
    assert_eq!(collect(f.all_records().unwrap()).len(), 3);
}

#[test]
fn test_vector_length_is_validated() {
    let dir = tempfile::tempdir().unwrap();
    let mut f = XcdfFile::open(dir.path().join("vec.xcd"), FileMode::Write).unwrap();
    f.add_unsigned_field("n", 1, None).unwrap();
    f.add_float_field("x", 0.0, Some("n")).unwrap();

    f.push_value("n", Value::Unsigned(2)).unwrap();
    f.push_value("x", Value::Float(1.0)).unwrap();
    match f.write_record() {
        Err(XcdfError::VectorLength { expected, found, .. }) => {
            assert_eq!((expected, found), (2, 1));
        }
        other => panic!("unexpected {:?}", other),
    }
    f.push_value("x", Value::Float(2.0)).unwrap();
    assert_eq!(f.write_record().unwrap(), 0);

    // an absent parent means no elements
    f.push_value("x", Value::Float(2.0)).unwrap();
    assert!(matches!(f.write_record(), Err(XcdfError::VectorLength { expected: 0, .. })));
}

#[test]
fn test_closed_file_refuses_operations() {
    let (_dir, path) = sample("closed.xcd");
    let mut f = XcdfFile::open(&path, FileMode::Read).unwrap();
    f.close().unwrap();
    assert!(matches!(f.header(), Err(XcdfError::NotOpen)));
    assert!(matches!(f.record_count(), Err(XcdfError::NotOpen)));
    assert!(matches!(f.all_records(), Err(XcdfError::NotOpen)));
    assert!(matches!(f.get_record(0, None), Err(XcdfError::NotOpen)));
    assert_eq!(XcdfError::NotOpen.kind(), ErrorKind::NotOpen);
}

#[test]
fn test_unknown_type_tag() {
    let dir = tempfile::tempdir().unwrap();
    let mut f = XcdfFile::open(dir.path().join("tag.xcd"), FileMode::Write).unwrap();
    assert!(!f.add_field("x", 3, Value::Unsigned(1), None).unwrap());
    assert!(!f.add_field("x", -1, Value::Unsigned(1), None).unwrap());
    assert_eq!(f.field_count().unwrap(), 0);
    assert!(f.add_field("x", 1, Value::Signed(1), None).unwrap());
    assert!(matches!(
        f.add_field("x", 1, Value::Signed(1), None),
        Err(XcdfError::DuplicateField(_))
    ));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_integer_quantization(values in prop::collection::vec(any::<u64>(), 1..8), res in 1u64..1000) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quant.xcd");
        {
            let mut f = XcdfFile::open(&path, FileMode::Write).unwrap();
            f.add_unsigned_field("q", res, None).unwrap();
            for v in &values {
                f.push_value("q", Value::Unsigned(*v)).unwrap();
                f.write_record().unwrap();
            }
        }
        let mut f = XcdfFile::open(&path, FileMode::Read).unwrap();
        let got = collect(f.all_records().unwrap());
        prop_assert_eq!(got.len(), values.len());
        for (t, v) in got.iter().zip(values.iter()) {
            prop_assert_eq!(&t[0], &Datum::Scalar(Value::Unsigned(v / res * res)));
        }
    }
}
