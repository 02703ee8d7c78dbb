//! Store file codec.
//!
//! Layout:
//!
//! ```text
//! [magic (8)] [header_len u32 LE] [header JSON]
//! [body_len u64 LE] [body (rkyv)] [blake3(body) (32)]
//! ```
//!
//! The header carries the schema signature so the compatibility check can run
//! without decoding the body.

use super::graph::ObjectGraph;
use super::object::StoredObject;
use crate::error::Error;
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::warn;

/// File magic, including a format revision byte.
pub const MAGIC: &[u8; 8] = b"SHELFST\x01";

/// Largest header accepted when reading.
const MAX_HEADER_LEN: u32 = 64 * 1024;

const CHECKSUM_LEN: usize = 32;

/// Store header, readable without decoding the body.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct StoreMetadata {
    /// Signature of the schema version the body conforms to.
    pub signature: String,
    /// Ordinal of that schema version when written (diagnostic only).
    pub version: u32,
    /// When the file was written (microseconds since Unix epoch).
    pub written_at: u64,
    /// Number of objects in the body.
    pub object_count: u64,
}

#[derive(Archive, Serialize, Deserialize)]
struct StoreBody {
    next_id: u64,
    objects: Vec<StoredObject>,
}

/// Encode a graph and its header into file bytes.
pub fn encode(metadata: &StoreMetadata, graph: &ObjectGraph) -> Result<Vec<u8>, Error> {
    let header =
        serde_json::to_vec(metadata).map_err(|e| Error::Serialization(e.to_string()))?;
    let header_len = u32::try_from(header.len())
        .map_err(|_| Error::Serialization("header too large".to_string()))?;

    let body = StoreBody {
        next_id: graph.next_id(),
        objects: graph.iter().cloned().collect(),
    };
    let body = rkyv::to_bytes::<rkyv::rancor::Error>(&body)
        .map_err(|e| Error::Serialization(e.to_string()))?;
    let checksum = blake3::hash(&body);

    let mut out = Vec::with_capacity(MAGIC.len() + 4 + header.len() + 8 + body.len() + CHECKSUM_LEN);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(&header);
    out.extend_from_slice(&(body.len() as u64).to_le_bytes());
    out.extend_from_slice(&body);
    out.extend_from_slice(checksum.as_bytes());
    Ok(out)
}

/// Decode file bytes into header and graph, verifying framing and checksum.
pub fn decode(bytes: &[u8]) -> Result<(StoreMetadata, ObjectGraph), Error> {
    let mut cursor = bytes;
    let metadata = read_header(&mut cursor)?;

    let body_len = take(&mut cursor, 8)?;
    let body_len = u64::from_le_bytes(to_array(body_len)?) as usize;
    let body = take(&mut cursor, body_len)?;
    let checksum = take(&mut cursor, CHECKSUM_LEN)?;
    if !cursor.is_empty() {
        return Err(Error::Corrupted(format!("{} trailing bytes", cursor.len())));
    }
    if blake3::hash(body).as_bytes() != checksum {
        return Err(Error::Corrupted("body checksum mismatch".to_string()));
    }

    // rkyv needs an aligned buffer; the body sits at an arbitrary file offset
    let mut aligned = AlignedVec::<16>::with_capacity(body.len());
    aligned.extend_from_slice(body);
    let body = rkyv::from_bytes::<StoreBody, rkyv::rancor::Error>(&aligned)
        .map_err(|e| Error::Deserialization(e.to_string()))?;

    if body.objects.len() as u64 != metadata.object_count {
        return Err(Error::Corrupted(format!(
            "header declares {} objects, body holds {}",
            metadata.object_count,
            body.objects.len()
        )));
    }
    Ok((metadata, ObjectGraph::from_parts(body.objects, body.next_id)))
}

/// Read only the header of a store file.
pub fn read_metadata(path: &Path) -> Result<StoreMetadata, Error> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 8];
    file.read_exact(&mut magic)
        .map_err(|_| Error::Corrupted("file shorter than magic".to_string()))?;
    if &magic != MAGIC {
        return Err(Error::Corrupted("bad magic".to_string()));
    }
    let mut len = [0u8; 4];
    file.read_exact(&mut len)
        .map_err(|_| Error::Corrupted("truncated header length".to_string()))?;
    let len = u32::from_le_bytes(len);
    if len > MAX_HEADER_LEN {
        return Err(Error::Corrupted(format!("header length {len} too large")));
    }
    let mut header = vec![0u8; len as usize];
    file.read_exact(&mut header)
        .map_err(|_| Error::Corrupted("truncated header".to_string()))?;
    serde_json::from_slice(&header).map_err(|e| Error::Deserialization(e.to_string()))
}

/// Read and decode a whole store file.
pub fn read_store(path: &Path) -> Result<(StoreMetadata, ObjectGraph), Error> {
    let bytes = std::fs::read(path)?;
    decode(&bytes)
}

/// Write bytes to a new file, optionally forcing them to disk.
pub fn write_file(path: &Path, bytes: &[u8], sync: bool) -> Result<(), Error> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    if sync {
        file.sync_all()?;
    }
    Ok(())
}

/// Replace `path` with `bytes` so readers see either the old or the new file.
///
/// Writes a temporary file in the same directory and renames it into place.
pub fn write_atomic(path: &Path, bytes: &[u8], sync: bool) -> Result<(), Error> {
    let parent = parent_dir(path);
    let mut tmp = tempfile::Builder::new()
        .prefix(".shelf-write-")
        .tempfile_in(parent)?;
    tmp.write_all(bytes)?;
    if sync {
        tmp.as_file().sync_all()?;
    }
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    if sync {
        sync_dir(parent);
    }
    Ok(())
}

/// Directory containing `path` (the current directory for bare file names).
pub fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    }
}

/// Flush a directory entry so a completed rename survives a crash.
///
/// A failed flush is logged rather than returned; the rename has already happened.
pub fn sync_dir(dir: &Path) {
    if let Err(e) = try_sync_dir(dir) {
        warn!(dir = %dir.display(), error = %e, "Directory fsync failed; rename may not be durable");
    }
}

fn try_sync_dir(dir: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    File::open(dir)?.sync_all()?;
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

fn read_header(cursor: &mut &[u8]) -> Result<StoreMetadata, Error> {
    let magic = take(cursor, MAGIC.len())?;
    if magic != MAGIC {
        return Err(Error::Corrupted("bad magic".to_string()));
    }
    let len = u32::from_le_bytes(to_array(take(cursor, 4)?)?);
    if len > MAX_HEADER_LEN {
        return Err(Error::Corrupted(format!("header length {len} too large")));
    }
    let header = take(cursor, len as usize)?;
    serde_json::from_slice(header).map_err(|e| Error::Deserialization(e.to_string()))
}

fn take<'a>(cursor: &mut &'a [u8], n: usize) -> Result<&'a [u8], Error> {
    if cursor.len() < n {
        return Err(Error::Corrupted(format!(
            "truncated: wanted {n} bytes, {} left",
            cursor.len()
        )));
    }
    let (head, tail) = cursor.split_at(n);
    *cursor = tail;
    Ok(head)
}

fn to_array<const N: usize>(bytes: &[u8]) -> Result<[u8; N], Error> {
    bytes
        .try_into()
        .map_err(|_| Error::Corrupted("bad length field".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{ObjectId, Value};

    fn sample() -> (StoreMetadata, ObjectGraph) {
        let mut book = StoredObject::new(ObjectId(1), "Book");
        book.set_attribute("title", Value::from("Title here"));
        book.set_attribute("pageCount", Value::Int32(382));
        book.push_related("subjects", ObjectId(2));
        let mut subject = StoredObject::new(ObjectId(2), "Subject");
        subject.set_attribute("name", Value::from("Fiction"));
        subject.push_related("books", ObjectId(1));

        let graph = ObjectGraph::from_parts(vec![book, subject], 3);
        let metadata = StoreMetadata {
            signature: "abc".into(),
            version: 1,
            written_at: 42,
            object_count: 2,
        };
        (metadata, graph)
    }

    #[test]
    fn test_store_file_roundtrip() {
        let (metadata, graph) = sample();
        let bytes = encode(&metadata, &graph).unwrap();
        let (decoded_meta, decoded) = decode(&bytes).unwrap();

        assert_eq!(decoded_meta, metadata);
        assert_eq!(decoded, graph);
    }

    #[test]
    fn test_checksum_detects_flipped_byte() {
        let (metadata, graph) = sample();
        let mut bytes = encode(&metadata, &graph).unwrap();
        let last_body_byte = bytes.len() - CHECKSUM_LEN - 1;
        bytes[last_body_byte] ^= 0xff;

        assert!(matches!(decode(&bytes), Err(Error::Corrupted(_))));
    }

    #[test]
    fn test_truncated_file_is_corrupted() {
        let (metadata, graph) = sample();
        let bytes = encode(&metadata, &graph).unwrap();
        assert!(matches!(
            decode(&bytes[..bytes.len() - 5]),
            Err(Error::Corrupted(_))
        ));
        assert!(matches!(decode(b"nope"), Err(Error::Corrupted(_))));
    }

    #[test]
    fn test_read_metadata_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.store");
        let (metadata, graph) = sample();
        write_file(&path, &encode(&metadata, &graph).unwrap(), false).unwrap();

        assert_eq!(read_metadata(&path).unwrap(), metadata);
        let (_, read_back) = read_store(&path).unwrap();
        assert_eq!(read_back.len(), 2);
    }

    #[test]
    fn test_write_atomic_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.store");
        std::fs::write(&path, b"old").unwrap();

        write_atomic(&path, b"new", true).unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"new");
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_sync_failure_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        assert!(try_sync_dir(dir.path()).is_ok());

        let missing = dir.path().join("gone");
        assert!(try_sync_dir(&missing).is_err());
        // logged, not propagated
        sync_dir(&missing);
    }
}
