//! Content-addressed deploy manifests.
//!
//! A manifest records every publishable file of a site directory with its
//! SHA-1 digest and buffered content. It is built once per deploy, sent to
//! the remote as a `path -> digest` listing, and then used to look up the
//! content of each digest the remote asks for.

use crate::fs::walker::walk_directory;
use crate::utils::Result;
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::collections::{BTreeMap, HashMap};
use std::io::{self, Read, Write};
use std::path::Path;
use tracing::debug;

/// A single file of a deploy: relative path, hex SHA-1 digest and content.
///
/// Cloning is cheap, the content buffer is reference counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    path: String,
    digest: String,
    content: Bytes,
}

impl FileRecord {
    /// Build a record from content already in memory.
    pub fn from_bytes(path: impl Into<String>, content: impl Into<Bytes>) -> Self {
        let content = content.into();
        let digest = hex::encode(Sha1::digest(&content));

        Self {
            path: path.into(),
            digest,
            content,
        }
    }

    /// Stream `reader` through the digest while buffering its bytes, so the
    /// upload never has to go back to disk.
    pub fn read_from(path: impl Into<String>, reader: &mut impl Read) -> io::Result<Self> {
        let mut sink = DigestBuffer::default();
        io::copy(reader, &mut sink)?;

        Ok(Self {
            path: path.into(),
            digest: hex::encode(sink.hasher.finalize()),
            content: Bytes::from(sink.buffer),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Content to upload. Each call hands out a new handle on the same buffer.
    pub fn content(&self) -> Bytes {
        self.content.clone()
    }

    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }
}

#[derive(Default)]
struct DigestBuffer {
    hasher: Sha1,
    buffer: Vec<u8>,
}

impl Write for DigestBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Deploy manifest with three co-indexed views built together:
///
/// - `files`: path -> record, one entry per included file
/// - `sums`: path -> digest, sent to the remote as the deploy's file listing
/// - `hashed`: digest -> record; paths with identical content share an entry
///
/// Every digest in `sums` has an entry in `hashed`. The manifest is never
/// mutated after construction.
#[derive(Debug, Default, Clone)]
pub struct Manifest {
    files: HashMap<String, FileRecord>,
    sums: BTreeMap<String, String>,
    hashed: HashMap<String, FileRecord>,
}

impl Manifest {
    /// Walk `root` and hash every publishable file.
    ///
    /// # Errors
    /// Any walk or read error aborts the whole build; no partial manifest is
    /// ever returned.
    pub fn build(root: &Path) -> Result<Self> {
        let mut records = Vec::new();

        for file in walk_directory(root)? {
            let mut handle = std::fs::File::open(&file.path)?;
            let record = FileRecord::read_from(file.relative_path, &mut handle)?;
            debug!("Hashed {} ({} bytes): {}", record.path, record.size(), record.digest);
            records.push(record);
        }

        Ok(Self::from_records(records))
    }

    /// Index a set of records. A later record with the same path replaces an
    /// earlier one.
    pub fn from_records(records: impl IntoIterator<Item = FileRecord>) -> Self {
        let mut files = HashMap::new();
        let mut sums = BTreeMap::new();
        let mut hashed = HashMap::new();

        for record in records {
            sums.insert(record.path.clone(), record.digest.clone());
            hashed.insert(record.digest.clone(), record.clone());
            files.insert(record.path.clone(), record);
        }

        // A replaced path may have left a digest nothing points at anymore.
        if hashed.len() > files.len() {
            hashed.retain(|digest, _| sums.values().any(|sum| sum == digest));
        }

        Self {
            files,
            sums,
            hashed,
        }
    }

    /// Number of included files.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// The `path -> digest` listing sent on deploy creation.
    pub fn sums(&self) -> &BTreeMap<String, String> {
        &self.sums
    }

    pub fn file(&self, path: &str) -> Option<&FileRecord> {
        self.files.get(path)
    }

    /// Content lookup for a digest the remote requires.
    pub fn by_digest(&self, digest: &str) -> Option<&FileRecord> {
        self.hashed.get(digest)
    }

    /// Number of distinct contents in the manifest.
    pub fn distinct_digests(&self) -> usize {
        self.hashed.len()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.values().map(FileRecord::size).sum()
    }

    /// Whether this manifest exceeds the synchronous deploy file limit.
    /// Exactly `limit` files is still synchronous.
    pub fn is_over_committed(&self, limit: usize) -> bool {
        self.len() > limit
    }
}
