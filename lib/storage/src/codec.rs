// Dataset file codec.
//
// Layout: 4-byte magic, u32 LE header length, JSON header, payload.
// The payload is the bincode-encoded element vector in row-major order,
// optionally gzip-compressed. The checksum covers the uncompressed payload.

use atomicwrites::{AtomicFile, OverwriteBehavior};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as GzLevel;
use ndarray::{ArrayD, IxDyn};
use pipestore_core::{Dataset, Dtype, Element, Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

const MAGIC: &[u8; 4] = b"PSDS";
const MAX_HEADER_LEN: usize = 1 << 20;

/// File extension of dataset files inside a group directory
pub const DATASET_EXT: &str = "ds";

/// Payload compression for a dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Compression {
    None,
    Gzip { level: u32 },
}

impl Default for Compression {
    fn default() -> Self {
        Compression::Gzip { level: 6 }
    }
}

impl Compression {
    pub fn gzip(level: u32) -> Result<Self> {
        if level > 9 {
            return Err(Error::InvalidConfig(format!(
                "gzip level must be 0..=9, got {}",
                level
            )));
        }
        Ok(Compression::Gzip { level })
    }
}

/// Metadata stored in front of every dataset payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetHeader {
    pub dtype: Dtype,
    pub shape: Vec<usize>,
    pub compression: Compression,
    pub checksum: String,
}

impl DatasetHeader {
    #[inline]
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }
}

fn payload_bytes<T: Element>(array: &ArrayD<T>) -> Result<Vec<u8>> {
    // iter() walks logical (row-major) order regardless of memory layout
    let values: Vec<T> = array.iter().copied().collect();
    bincode::serialize(&values).map_err(|e| Error::Serialization(e.to_string()))
}

fn decode_payload<T: Element>(path: &Path, shape: &[usize], payload: &[u8]) -> Result<Dataset> {
    let values: Vec<T> =
        bincode::deserialize(payload).map_err(|e| Error::corrupt(path, e))?;
    let array = ArrayD::from_shape_vec(IxDyn(shape), values)
        .map_err(|e| Error::corrupt(path, format!("shape {:?}: {}", shape, e)))?;
    Ok(T::wrap(array))
}

/// Serialize a dataset into its on-disk byte representation.
pub fn encode(dataset: &Dataset, compression: Compression) -> Result<Vec<u8>> {
    let payload = match dataset {
        Dataset::I64(a) => payload_bytes(a)?,
        Dataset::F32(a) => payload_bytes(a)?,
        Dataset::F64(a) => payload_bytes(a)?,
    };

    let header = DatasetHeader {
        dtype: dataset.dtype(),
        shape: dataset.shape().to_vec(),
        compression,
        checksum: format!("{:x}", Sha256::digest(&payload)),
    };
    let header_json =
        serde_json::to_vec(&header).map_err(|e| Error::Serialization(e.to_string()))?;

    let body = match compression {
        Compression::None => payload,
        Compression::Gzip { level } => {
            let mut encoder = GzEncoder::new(Vec::new(), GzLevel::new(level));
            encoder.write_all(&payload)?;
            encoder.finish()?
        }
    };

    let mut out = Vec::with_capacity(8 + header_json.len() + body.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&(header_json.len() as u32).to_le_bytes());
    out.extend_from_slice(&header_json);
    out.extend_from_slice(&body);
    Ok(out)
}

fn read_header_from<R: Read>(path: &Path, reader: &mut R) -> Result<DatasetHeader> {
    let mut magic = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .map_err(|e| Error::corrupt(path, format!("truncated magic: {}", e)))?;
    if &magic != MAGIC {
        return Err(Error::corrupt(path, "bad magic"));
    }

    let mut len = [0u8; 4];
    reader
        .read_exact(&mut len)
        .map_err(|e| Error::corrupt(path, format!("truncated header length: {}", e)))?;
    let len = u32::from_le_bytes(len) as usize;
    if len > MAX_HEADER_LEN {
        return Err(Error::corrupt(path, format!("header length {} too large", len)));
    }
    let mut header_json = vec![0u8; len];
    reader
        .read_exact(&mut header_json)
        .map_err(|e| Error::corrupt(path, format!("truncated header: {}", e)))?;

    serde_json::from_slice(&header_json).map_err(|e| Error::corrupt(path, e))
}

/// Read only the header of a dataset file; the payload is not touched.
pub fn read_header(path: &Path) -> Result<DatasetHeader> {
    let mut reader = BufReader::new(File::open(path)?);
    read_header_from(path, &mut reader)
}

/// Read and verify a full dataset file.
pub fn read(path: &Path) -> Result<Dataset> {
    let mut reader = BufReader::new(File::open(path)?);
    let header = read_header_from(path, &mut reader)?;

    let mut body = Vec::new();
    reader.read_to_end(&mut body)?;

    let payload = match header.compression {
        Compression::None => body,
        Compression::Gzip { .. } => {
            let mut decoder = GzDecoder::new(body.as_slice());
            let mut payload = Vec::new();
            decoder
                .read_to_end(&mut payload)
                .map_err(|e| Error::corrupt(path, format!("gzip: {}", e)))?;
            payload
        }
    };

    let checksum = format!("{:x}", Sha256::digest(&payload));
    if checksum != header.checksum {
        return Err(Error::corrupt(
            path,
            format!("checksum mismatch: expected {}, got {}", header.checksum, checksum),
        ));
    }

    match header.dtype {
        Dtype::I64 => decode_payload::<i64>(path, &header.shape, &payload),
        Dtype::F32 => decode_payload::<f32>(path, &header.shape, &payload),
        Dtype::F64 => decode_payload::<f64>(path, &header.shape, &payload),
    }
}

/// Write a dataset file, atomically replacing any previous file at `path`.
pub fn write(path: &Path, dataset: &Dataset, compression: Compression) -> Result<()> {
    let bytes = encode(dataset, compression)?;
    AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
        .write(|f| f.write_all(&bytes))
        .map_err(|e| match e {
            atomicwrites::Error::Internal(e) | atomicwrites::Error::User(e) => Error::Io(e),
        })
}
