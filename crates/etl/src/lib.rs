//! ETL data collector.
//!
//! This crate is useful for dumping unsorted data into temporary files and
//! loading its sorted representation later on.
//!
//! This has multiple uses, such as optimizing database inserts (for Btree
//! based databases) and memory management (as it moves the buffer to disk
//! instead of memory).

#![warn(missing_debug_implementations, missing_docs, unreachable_pub, rustdoc::all)]
#![deny(unused_must_use, rust_2018_idioms)]

use std::{
    cmp::Reverse,
    collections::BinaryHeap,
    io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write},
    path::Path,
    sync::Arc,
};

use alloy_primitives::hex;
use tempfile::{NamedTempFile, TempDir};
use weft_db::{
    cursor::DbCursorRW,
    table::{Compress, Decode, Decompress, Encode, Key, Table, Value},
    DatabaseError,
};

/// An error raised while collecting or loading ETL data.
#[derive(Debug, thiserror::Error)]
pub enum EtlError {
    /// A temporary spill file could not be written or read back.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The target table rejected a loaded entry.
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// How [`Collector::load`] writes entries into the target table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// Insert or overwrite entries at arbitrary positions.
    Upsert,
    /// Bulk-append entries; every loaded key must be greater than the target
    /// table's current maximum.
    Append,
}

/// An ETL (extract, transform, load) data collector.
///
/// Data is pushed (extract) to the collector which internally flushes the data
/// in a sorted (transform) manner to files of some specified capacity.
///
/// The data can later be loaded (load) into a target table in a globally
/// sorted manner, merging the spilled runs and whatever remains in memory.
#[derive(Debug)]
pub struct Collector<K, V>
where
    K: Key,
    V: Value,
{
    /// Directory for temporary file storage.
    dir: Arc<TempDir>,
    /// Collection of temporary ETL files.
    files: Vec<EtlFile>,
    /// Current buffer size in bytes.
    buffer_size_bytes: usize,
    /// Maximum buffer capacity in bytes, triggers flush when reached.
    buffer_capacity_bytes: usize,
    /// In-memory buffer storing encoded and compressed key-value pairs.
    buffer: Vec<(Vec<u8>, Vec<u8>)>,
    /// Total number of bytes pushed into the collector, including all files.
    total_size_bytes: usize,
    /// Total number of elements in the collector, including all files.
    len: usize,
    /// The last key handed to the target during [`Collector::load`], kept for
    /// progress reporting.
    load_key: Option<String>,
    _marker: std::marker::PhantomData<(K, V)>,
}

impl<K, V> Collector<K, V>
where
    K: Key,
    V: Value,
{
    /// Create a new collector in a specific temporary directory with some
    /// capacity.
    ///
    /// Once the capacity (in bytes) is reached, the data is sorted and flushed
    /// to disk.
    pub fn new(dir: Arc<TempDir>, buffer_capacity_bytes: usize) -> Self {
        Self {
            dir,
            files: Vec::new(),
            buffer_size_bytes: 0,
            buffer_capacity_bytes,
            buffer: Vec::new(),
            total_size_bytes: 0,
            len: 0,
            load_key: None,
            _marker: std::marker::PhantomData,
        }
    }

    /// Returns the number of elements currently in the collector.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if there are currently no elements in the collector.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of bytes pushed into the collector so far, across
    /// the in-memory buffer and all spilled runs.
    pub fn bytes_size(&self) -> usize {
        self.total_size_bytes
    }

    /// The last key handed to the target table during [`Collector::load`],
    /// hex encoded.
    pub fn load_key(&self) -> Option<&str> {
        self.load_key.as_deref()
    }

    /// Insert an entry into the collector.
    pub fn collect(&mut self, key: K, value: V) -> Result<(), EtlError> {
        let key = key.encode().as_ref().to_vec();
        let value = value.compress().as_ref().to_vec();
        self.buffer_size_bytes += key.len() + value.len();
        self.total_size_bytes += key.len() + value.len();
        self.buffer.push((key, value));
        if self.buffer_size_bytes > self.buffer_capacity_bytes {
            self.flush()?;
        }
        self.len += 1;
        Ok(())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.buffer_size_bytes = 0;
        self.buffer.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        let mut buf = Vec::with_capacity(self.buffer.len());
        std::mem::swap(&mut buf, &mut self.buffer);
        self.files.push(EtlFile::new(self.dir.path(), buf)?);
        Ok(())
    }

    /// Returns an iterator over the collector data.
    ///
    /// The items of the iterator are sorted across all underlying files and
    /// the in-memory buffer.
    ///
    /// # Note
    ///
    /// The keys and values have been pre-encoded, meaning they *SHOULD NOT* be
    /// encoded or compressed again.
    pub fn iter(&mut self) -> std::io::Result<EtlIter<'_>> {
        // Flush the remaining items to disk
        if self.buffer_size_bytes > 0 {
            self.flush()?;
        }

        let mut heap = BinaryHeap::new();
        for (current_id, file) in self.files.iter_mut().enumerate() {
            if let Some((current_key, current_value)) = file.read_next()? {
                heap.push((Reverse((current_key, current_value)), current_id));
            }
        }

        Ok(EtlIter { heap, files: &mut self.files })
    }

    /// Merge all spilled runs and the in-memory buffer and write every entry
    /// into `target` in ascending key order.
    ///
    /// With [`LoadMode::Append`] the target table must be empty or its current
    /// maximum key must be below every loaded key; a violation aborts the
    /// load. On success the collector is left empty and its temporary files
    /// are removed.
    pub fn load<T, C>(&mut self, target: &mut C, mode: LoadMode) -> Result<(), EtlError>
    where
        T: Table<Key = K, Value = V>,
        C: DbCursorRW<T>,
    {
        // Flush the remaining items to disk
        if self.buffer_size_bytes > 0 {
            self.flush()?;
        }

        let mut heap = BinaryHeap::new();
        for (current_id, file) in self.files.iter_mut().enumerate() {
            if let Some(entry) = file.read_next()? {
                heap.push((Reverse(entry), current_id));
            }
        }

        let mut iter = EtlIter { heap, files: &mut self.files };
        let mut last_key = None;
        for entry in &mut iter {
            let (raw_key, raw_value) = entry?;

            let key = <T::Key as Decode>::decode(&raw_key)?;
            let value = <T::Value as Decompress>::decompress(&raw_value)?;
            match mode {
                LoadMode::Upsert => target.upsert(key, value)?,
                LoadMode::Append => target.append(key, value)?,
            }
            last_key = Some(format!("0x{}", hex::encode(&raw_key)));
        }
        drop(iter);

        if last_key.is_some() {
            self.load_key = last_key;
        }
        self.files.clear();
        self.buffer.clear();
        self.buffer_size_bytes = 0;
        self.total_size_bytes = 0;
        self.len = 0;
        Ok(())
    }
}

/// An iterator over sorted data in a collection of ETL files.
#[derive(Debug)]
pub struct EtlIter<'a> {
    /// Heap managing the next items to be iterated.
    #[allow(clippy::type_complexity)]
    heap: BinaryHeap<(Reverse<(Vec<u8>, Vec<u8>)>, usize)>,
    /// Reference to the vector of ETL files being iterated over.
    files: &'a mut Vec<EtlFile>,
}

impl EtlIter<'_> {
    /// Peeks into the next element.
    pub fn peek(&self) -> Option<&(Vec<u8>, Vec<u8>)> {
        self.heap.peek().map(|(Reverse(entry), _)| entry)
    }
}

impl Iterator for EtlIter<'_> {
    type Item = std::io::Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        // Get the next sorted entry from the heap
        let (Reverse(entry), id) = self.heap.pop()?;

        // Populate the heap with the next entry from the same file
        match self.files[id].read_next() {
            Ok(Some((key, value))) => {
                self.heap.push((Reverse((key, value)), id));
                Some(Ok(entry))
            }
            Ok(None) => Some(Ok(entry)),
            err => err.transpose(),
        }
    }
}

/// A temporary ETL file.
///
/// The backing file is removed when the value is dropped.
#[derive(Debug)]
struct EtlFile {
    file: BufReader<NamedTempFile>,
    len: usize,
}

impl EtlFile {
    /// Create a new file with the given data (which should be pre-sorted) at
    /// the given path.
    ///
    /// The file will be a temporary file.
    fn new<K, V>(dir: &Path, buffer: Vec<(K, V)>) -> std::io::Result<Self>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        let file = NamedTempFile::new_in(dir)?;
        let mut w = BufWriter::new(file);
        for entry in &buffer {
            let k = entry.0.as_ref();
            let v = entry.1.as_ref();

            w.write_all(&k.len().to_be_bytes())?;
            w.write_all(&v.len().to_be_bytes())?;
            w.write_all(k)?;
            w.write_all(v)?;
        }

        let mut file = BufReader::new(w.into_inner()?);
        file.seek(SeekFrom::Start(0))?;
        let len = buffer.len();
        Ok(Self { file, len })
    }

    /// Read the next entry in the file.
    fn read_next(&mut self) -> std::io::Result<Option<(Vec<u8>, Vec<u8>)>> {
        if self.len == 0 {
            return Ok(None)
        }

        let mut buffer_key_length = [0; 8];
        let mut buffer_value_length = [0; 8];

        self.file.read_exact(&mut buffer_key_length)?;
        self.file.read_exact(&mut buffer_value_length)?;

        let key_length = usize::from_be_bytes(buffer_key_length);
        let value_length = usize::from_be_bytes(buffer_value_length);
        let mut key = vec![0; key_length];
        let mut value = vec![0; value_length];

        self.file.read_exact(&mut key)?;
        self.file.read_exact(&mut value)?;

        self.len -= 1;

        Ok(Some((key, value)))
    }
}
