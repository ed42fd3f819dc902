use crate::error::{Result, XcdfError};
use crate::types::{ChecksumType, CompressionType};

/// Knobs for reading and writing files.
#[derive(Clone, Debug, PartialEq)]
pub struct XcdfConfig {
    pub compression: CompressionType,
    pub zstd_level: i32,
    pub checksum: ChecksumType,
    /// Size of the write buffer in bytes.
    pub write_buffer: usize,
    /// Check record checksums while reading.
    pub verify_checksums: bool,
}

impl Default for XcdfConfig {
    fn default() -> Self {
        XcdfConfig {
            compression: CompressionType::Auto,
            zstd_level: 5,
            checksum: ChecksumType::Adler32,
            write_buffer: 4096,
            verify_checksums: true,
        }
    }
}

impl XcdfConfig {
    pub fn with_compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_zstd_level(mut self, level: i32) -> Self {
        self.zstd_level = level;
        self
    }

    pub fn with_checksum(mut self, checksum: ChecksumType) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn with_write_buffer(mut self, size: usize) -> Self {
        self.write_buffer = size;
        self
    }

    pub fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Parses lines such as `compression lz4` or `checksum none` on top of
    /// the defaults. `#` starts a comment.
    pub fn parse_string(s: &str) -> Result<Self> {
        let mut config = XcdfConfig::default();

        for (i, line) in s.lines().enumerate() {
            let comment_start = line.find('#').unwrap_or(line.len());
            let (lnu, _) = line.split_at(comment_start);
            let mut parts = lnu.split_whitespace();
            let err = |message: String| XcdfError::ConfigParse {
                line: i + 1,
                message,
            };

            let key = match parts.next() {
                Some(k) => k,
                None => continue,
            };
            let value = parts
                .next()
                .ok_or_else(|| err(format!("missing value for '{}'", key)))?;
            if let Some(extra) = parts.next() {
                return Err(err(format!("unexpected '{}'", extra)));
            }

            match key {
                "compression" => {
                    config.compression = match value {
                        "none" => CompressionType::None,
                        "lz4" => CompressionType::Lz4,
                        "zstd" => CompressionType::Zstd,
                        "auto" => CompressionType::Auto,
                        _ => return Err(err(format!("unknown compression '{}'", value))),
                    }
                }
                "checksum" => {
                    config.checksum = match value {
                        "adler32" => ChecksumType::Adler32,
                        "none" => ChecksumType::None,
                        _ => return Err(err(format!("unknown checksum '{}'", value))),
                    }
                }
                "zstd_level" => {
                    config.zstd_level = value
                        .parse()
                        .map_err(|_| err(format!("bad zstd level '{}'", value)))?;
                }
                "buffer" => {
                    config.write_buffer = value
                        .parse()
                        .map_err(|_| err(format!("bad buffer size '{}'", value)))?;
                }
                "verify" => {
                    config.verify_checksums = match value {
                        "on" | "true" => true,
                        "off" | "false" => false,
                        _ => return Err(err(format!("bad verify flag '{}'", value))),
                    }
                }
                _ => return Err(err(format!("unknown setting '{}'", key))),
            }
        }

        Ok(config)
    }
}

#[test]
fn test_parse_config() {
    let c = XcdfConfig::parse_string(
        "# writer settings\ncompression zstd\nzstd_level 9  # slow\n\nchecksum none\nverify off\n",
    )
    .unwrap();
    assert_eq!(c.compression, CompressionType::Zstd);
    assert_eq!(c.zstd_level, 9);
    assert_eq!(c.checksum, ChecksumType::None);
    assert!(!c.verify_checksums);
    assert_eq!(c.write_buffer, 4096);
}

#[test]
fn test_parse_config_errors() {
    match XcdfConfig::parse_string("checksum adler32\ncompression brotli") {
        Err(XcdfError::ConfigParse { line, .. }) => assert_eq!(line, 2),
        other => panic!("unexpected {:?}", other),
    }
    assert!(XcdfConfig::parse_string("buffer").is_err());
    assert!(XcdfConfig::parse_string("reorder a b").is_err());
}
