//! Binary index files.
//!
//! An index file holds, in order: a [`FileHeader`] (magic, version, dim,
//! num_tables, num_bits, seed), the hyperplane arena, the record count, and
//! every `(id, vector)` record in ascending id order. All sections are bincode
//! with its default fixed-width little-endian encoding. A footer
//! `[magic "LCR1"][u32 CRC32 BE]` covers the whole payload.
//!
//! Bucket contents are never written; they are recomputed from the records on
//! load. Each write goes to its own temp file in the target directory and is
//! then renamed over the target, so concurrent saves never share a temp file.

use crate::config::{IndexConfig, FILE_MAGIC, FOOTER_MAGIC, FORMAT_VERSION};
use crate::error::{IndexError, IndexResult};
use crate::index::IndexData;
use crate::lsh::Hasher;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Bytes per record excluding the vector body: id (u64) + vector length (u64).
const RECORD_OVERHEAD_BYTES: usize = 16;

/// Fixed-size header at the start of every index file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileHeader {
    pub magic: [u8; 4],
    pub version: u32,
    pub dimension: u32,
    pub num_tables: u32,
    pub num_bits: u32,
    pub seed: u64,
}

impl FileHeader {
    fn for_config(config: &IndexConfig) -> Self {
        Self {
            magic: *FILE_MAGIC,
            version: FORMAT_VERSION,
            dimension: config.dimension as u32,
            num_tables: config.num_tables as u32,
            num_bits: config.num_bits as u32,
            seed: config.seed,
        }
    }

    /// The index parameters this header declares.
    pub fn config(&self) -> IndexConfig {
        IndexConfig {
            dimension: self.dimension as usize,
            num_tables: self.num_tables as usize,
            num_bits: self.num_bits as usize,
            seed: self.seed,
        }
    }
}

/// Everything decoded from an index file, before bucket assignment.
#[derive(Debug)]
pub struct DecodedIndex {
    pub config: IndexConfig,
    pub hasher: Hasher,
    pub records: Vec<(u64, Vec<f32>)>,
}

fn codec_err(e: bincode::Error) -> IndexError {
    IndexError::format(format!("decode failed: {}", e))
}

/// Serializes the full index state into file bytes, footer included.
pub fn encode_index(data: &IndexData) -> IndexResult<Vec<u8>> {
    let header = FileHeader::for_config(&data.config);
    let dim = data.config.dimension;
    let count = data.store.len();

    let mut out = Vec::with_capacity(
        64 + data.hasher.planes().len() * 4 + count * (RECORD_OVERHEAD_BYTES + dim * 4),
    );
    bincode::serialize_into(&mut out, &header).map_err(codec_err)?;
    bincode::serialize_into(&mut out, data.hasher.planes()).map_err(codec_err)?;
    bincode::serialize_into(&mut out, &(count as u64)).map_err(codec_err)?;
    for id in data.store.sorted_ids() {
        let vector = data.store.get(id)?;
        bincode::serialize_into(&mut out, &(id, vector)).map_err(codec_err)?;
    }

    let crc = crc32fast::hash(&out);
    out.extend_from_slice(FOOTER_MAGIC);
    out.extend_from_slice(&crc.to_be_bytes());
    Ok(out)
}

/// Writes `bytes` to `path` atomically: unique temp file, then rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> IndexResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))?;
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Strips and verifies the CRC32 footer, returning the payload.
pub fn verify_footer(raw: &[u8]) -> IndexResult<&[u8]> {
    if raw.len() < 8 || &raw[raw.len() - 8..raw.len() - 4] != FOOTER_MAGIC {
        return Err(IndexError::format(
            "missing checksum footer (file truncated or not an index file)",
        ));
    }
    let payload = &raw[..raw.len() - 8];
    let stored_crc = u32::from_be_bytes([
        raw[raw.len() - 4],
        raw[raw.len() - 3],
        raw[raw.len() - 2],
        raw[raw.len() - 1],
    ]);
    let computed_crc = crc32fast::hash(payload);
    if computed_crc != stored_crc {
        return Err(IndexError::format(format!(
            "CRC32 mismatch: expected {:#010x}, got {:#010x}",
            stored_crc, computed_crc
        )));
    }
    tracing::debug!("Index file CRC32 verified: {:#010x}", stored_crc);
    Ok(payload)
}

/// Decodes and checks the header. Fails before any hyperplane or record is
/// read when `expected_dim` is given and differs from the declared dim.
pub fn decode_header(
    cursor: &mut &[u8],
    expected_dim: Option<usize>,
) -> IndexResult<FileHeader> {
    let header: FileHeader = bincode::deserialize_from(&mut *cursor).map_err(codec_err)?;
    if &header.magic != FILE_MAGIC {
        return Err(IndexError::format(format!(
            "bad magic {:?}, expected {:?}",
            header.magic, FILE_MAGIC
        )));
    }
    if header.version != FORMAT_VERSION {
        return Err(IndexError::format(format!(
            "unsupported format version {} (supported: {})",
            header.version, FORMAT_VERSION
        )));
    }
    if let Some(expected) = expected_dim {
        IndexError::check_dimension(expected, header.dimension as usize)?;
    }
    header
        .config()
        .validate()
        .map_err(|e| IndexError::format(format!("invalid header: {}", e)))?;
    Ok(header)
}

/// Decodes a complete index file payload (footer already stripped).
pub fn decode_index(payload: &[u8], expected_dim: Option<usize>) -> IndexResult<DecodedIndex> {
    let mut cursor = payload;
    let header = decode_header(&mut cursor, expected_dim)?;
    let config = header.config();
    let dim = config.dimension;

    let planes: Vec<f32> = bincode::deserialize_from(&mut cursor).map_err(codec_err)?;
    let hasher = Hasher::from_planes(dim, config.num_tables, config.num_bits, planes)?;

    let count: u64 = bincode::deserialize_from(&mut cursor).map_err(codec_err)?;
    let record_bytes = RECORD_OVERHEAD_BYTES + dim * 4;
    let fits = count
        .checked_mul(record_bytes as u64)
        .is_some_and(|needed| needed <= cursor.len() as u64);
    if !fits {
        return Err(IndexError::format(format!(
            "record count {} exceeds remaining {} bytes",
            count,
            cursor.len()
        )));
    }

    let mut records = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let (id, vector): (u64, Vec<f32>) =
            bincode::deserialize_from(&mut cursor).map_err(codec_err)?;
        if vector.len() != dim {
            return Err(IndexError::format(format!(
                "record {} has {} components, header declares {}",
                id,
                vector.len(),
                dim
            )));
        }
        records.push((id, vector));
    }
    if !cursor.is_empty() {
        return Err(IndexError::format(format!(
            "{} trailing bytes after last record",
            cursor.len()
        )));
    }

    Ok(DecodedIndex {
        config,
        hasher,
        records,
    })
}

/// Reads and decodes an index file.
pub fn read_index(path: &Path, expected_dim: Option<usize>) -> IndexResult<DecodedIndex> {
    let raw = fs::read(path)?;
    let payload = verify_footer(&raw)?;
    let decoded = decode_index(payload, expected_dim)?;
    tracing::info!(
        "Read index file {:?} ({} records, dim={}, tables={}, bits={})",
        path,
        decoded.records.len(),
        decoded.config.dimension,
        decoded.config.num_tables,
        decoded.config.num_bits
    );
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(header: &FileHeader) -> Vec<u8> {
        bincode::serialize(header).unwrap()
    }

    fn sample_header() -> FileHeader {
        FileHeader::for_config(&IndexConfig::new(4, 2, 3).with_seed(11))
    }

    #[test]
    fn test_header_layout_is_fixed_width() {
        // 4 magic + 4 version + 3 * 4 params + 8 seed.
        let bytes = header_bytes(&sample_header());
        assert_eq!(bytes.len(), 28);
        assert_eq!(&bytes[..4], b"LSHV");
        assert_eq!(u32::from_le_bytes(bytes[8..12].try_into().unwrap()), 4);
    }

    #[test]
    fn test_decode_header_checks_magic() {
        let mut header = sample_header();
        header.magic = *b"NOPE";
        let bytes = header_bytes(&header);
        let err = decode_header(&mut bytes.as_slice(), None).unwrap_err();
        assert!(matches!(err, IndexError::FormatError(_)));
    }

    #[test]
    fn test_decode_header_checks_version() {
        let mut header = sample_header();
        header.version = 99;
        let bytes = header_bytes(&header);
        let err = decode_header(&mut bytes.as_slice(), None).unwrap_err();
        assert!(matches!(err, IndexError::FormatError(_)));
    }

    #[test]
    fn test_decode_header_checks_expected_dim() {
        let bytes = header_bytes(&sample_header());
        let err = decode_header(&mut bytes.as_slice(), Some(8)).unwrap_err();
        assert!(matches!(
            err,
            IndexError::InvalidDimension {
                expected: 8,
                actual: 4
            }
        ));
        let header = decode_header(&mut bytes.as_slice(), Some(4)).unwrap();
        assert_eq!(header.config().num_bits, 3);
        assert_eq!(header.seed, 11);
    }

    #[test]
    fn test_verify_footer_rejects_short_and_corrupt_input() {
        assert!(matches!(
            verify_footer(b"abc"),
            Err(IndexError::FormatError(_))
        ));

        let payload = b"payload".to_vec();
        let mut raw = payload.clone();
        raw.extend_from_slice(FOOTER_MAGIC);
        raw.extend_from_slice(&crc32fast::hash(&payload).to_be_bytes());
        assert_eq!(verify_footer(&raw).unwrap(), payload.as_slice());

        raw[0] ^= 0xFF;
        assert!(matches!(
            verify_footer(&raw),
            Err(IndexError::FormatError(_))
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_record_count() {
        let header = sample_header();
        let mut payload = header_bytes(&header);
        bincode::serialize_into(&mut payload, &vec![0.5f32; 4 * 2 * 3]).unwrap();
        bincode::serialize_into(&mut payload, &u64::MAX).unwrap();
        let err = decode_index(&payload, None).unwrap_err();
        assert!(matches!(err, IndexError::FormatError(_)));
    }

    #[test]
    fn test_decode_rejects_short_vector() {
        let header = sample_header();
        let mut payload = header_bytes(&header);
        bincode::serialize_into(&mut payload, &vec![0.5f32; 4 * 2 * 3]).unwrap();
        bincode::serialize_into(&mut payload, &2u64).unwrap();
        bincode::serialize_into(&mut payload, &(1u64, vec![1.0f32; 4])).unwrap();
        // Second record padded out to look plausible but with 3 components.
        bincode::serialize_into(&mut payload, &(2u64, vec![1.0f32; 3])).unwrap();
        payload.extend_from_slice(&[0u8; 4]);
        let err = decode_index(&payload, None).unwrap_err();
        assert!(matches!(err, IndexError::FormatError(_)));
    }

    #[test]
    fn test_decode_minimal_payload() {
        let header = sample_header();
        let mut payload = header_bytes(&header);
        bincode::serialize_into(&mut payload, &vec![0.25f32; 4 * 2 * 3]).unwrap();
        bincode::serialize_into(&mut payload, &1u64).unwrap();
        bincode::serialize_into(&mut payload, &(7u64, vec![1.0f32, 2.0, 3.0, 4.0])).unwrap();
        let decoded = decode_index(&payload, Some(4)).unwrap();
        assert_eq!(decoded.config, IndexConfig::new(4, 2, 3).with_seed(11));
        assert_eq!(decoded.records, vec![(7, vec![1.0, 2.0, 3.0, 4.0])]);
        assert_eq!(decoded.hasher.planes().len(), 24);
    }

    #[test]
    fn test_write_atomic_replaces_and_leaves_no_temp_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("vectors.bin");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");
        let entries: Vec<_> = fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_write_atomic_sets_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("vectors.bin");
        write_atomic(&path, b"data").unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
