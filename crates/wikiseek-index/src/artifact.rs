//! On-disk codec for the vector artifact.
//!
//! Layout of `index.vec`:
//!
//! ```text
//! magic      [u8; 4]  b"WSIX"
//! version    u32 LE
//! dimension  u32 LE
//! count      u64 LE
//! payload    count * dimension * f32 LE
//! checksum   [u8; 32] blake3 of payload bytes
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use wikiseek_core::{Result, WikiseekError};

/// Vector artifact file name.
pub const INDEX_FILE: &str = "index.vec";

/// Chunk metadata file name.
pub const METADATA_FILE: &str = "metadata.json";

const MAGIC: [u8; 4] = *b"WSIX";
const FORMAT_VERSION: u32 = 1;

const HEADER_LEN: u64 = 4 + 4 + 4 + 8;
const CHECKSUM_LEN: u64 = 32;

/// Decoded vector artifact.
#[derive(Debug)]
pub struct VectorPayload {
    pub dimension: usize,
    pub count: usize,
    /// Row-major flattened vectors, `count * dimension` values.
    pub data: Vec<f32>,
    pub checksum: [u8; 32],
}

/// Write the vector artifact. The caller is responsible for atomicity
/// (write to a temp path, then rename).
pub fn write_vectors(path: &Path, dimension: usize, data: &[f32]) -> Result<[u8; 32]> {
    debug_assert_eq!(data.len() % dimension.max(1), 0);
    let count = if dimension == 0 { 0 } else { data.len() / dimension };

    let file = File::create(path)?;
    let mut w = BufWriter::new(file);

    w.write_all(&MAGIC)?;
    w.write_all(&FORMAT_VERSION.to_le_bytes())?;
    w.write_all(&(dimension as u32).to_le_bytes())?;
    w.write_all(&(count as u64).to_le_bytes())?;

    let mut hasher = blake3::Hasher::new();
    for value in data {
        let bytes = value.to_le_bytes();
        hasher.update(&bytes);
        w.write_all(&bytes)?;
    }

    let checksum = *hasher.finalize().as_bytes();
    w.write_all(&checksum)?;
    w.flush()?;

    Ok(checksum)
}

/// Read and verify the vector artifact.
pub fn read_vectors(path: &Path) -> Result<VectorPayload> {
    let display = path.display().to_string();
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut r = BufReader::new(file);

    let mut magic = [0u8; 4];
    read_exact(&mut r, &mut magic, &display, "magic")?;
    if magic != MAGIC {
        return Err(WikiseekError::corrupt(&display, "bad magic"));
    }

    let mut buf4 = [0u8; 4];
    read_exact(&mut r, &mut buf4, &display, "version")?;
    let version = u32::from_le_bytes(buf4);
    if version != FORMAT_VERSION {
        return Err(WikiseekError::corrupt(
            &display,
            format!("unsupported format version {}", version),
        ));
    }

    read_exact(&mut r, &mut buf4, &display, "dimension")?;
    let dimension = u32::from_le_bytes(buf4) as usize;

    let mut buf8 = [0u8; 8];
    read_exact(&mut r, &mut buf8, &display, "count")?;
    let count = u64::from_le_bytes(buf8) as usize;

    let total = count
        .checked_mul(dimension)
        .ok_or_else(|| WikiseekError::corrupt(&display, "vector count overflows"))?;

    // The header's promised payload comes from untrusted bytes; check it
    // against the actual file length before allocating anything.
    let expected_len = (total as u64)
        .checked_mul(4)
        .and_then(|payload| payload.checked_add(HEADER_LEN + CHECKSUM_LEN))
        .ok_or_else(|| WikiseekError::corrupt(&display, "vector count overflows"))?;
    if file_len != expected_len {
        return Err(WikiseekError::corrupt(
            &display,
            "file length disagrees with header",
        ));
    }

    let mut data = Vec::with_capacity(total);
    let mut hasher = blake3::Hasher::new();
    let mut value = [0u8; 4];
    for _ in 0..total {
        read_exact(&mut r, &mut value, &display, "payload")?;
        hasher.update(&value);
        data.push(f32::from_le_bytes(value));
    }

    let mut stored = [0u8; 32];
    read_exact(&mut r, &mut stored, &display, "checksum")?;

    let computed = *hasher.finalize().as_bytes();
    if stored != computed {
        return Err(WikiseekError::corrupt(&display, "payload checksum mismatch"));
    }

    Ok(VectorPayload {
        dimension,
        count,
        data,
        checksum: computed,
    })
}

fn read_exact(r: &mut impl Read, buf: &mut [u8], path: &str, what: &str) -> Result<()> {
    r.read_exact(buf)
        .map_err(|_| WikiseekError::corrupt(path, format!("truncated {}", what)))
}
