//! Fixed-layout binary file holding one calendar day of records.
//!
//! Every record written at a given second is a node of a singly linked list
//! (the second's chain) in an append-only data region. A fixed index table
//! maps each second of the day to the head and tail of its chain, so a point
//! lookup is one index read plus a walk of that chain.
//!
//! # File Format
//!
//! All integers are little-endian.
//!
//! ```text
//! [0..8)            Magic (u64)
//! [8..16)           Day baseline (i64 unix seconds)
//! [16..691216)      Index table: 86400 x SecondSlot { first: u32, last: u32 }
//! [691216..)        Data region: RecordFrame*
//!
//! RecordFrame:
//! [+0..+8)          Timestamp (i64, equals the owning second)
//! [+8..+12)         Next frame offset (u32, 0 = end of chain)
//! [+12..+16)        Payload length (u32)
//! [+16..+16+len)    Payload
//! ```
//!
//! Offset 0 can never hold a frame, so it doubles as the "empty" marker in
//! slots and the end-of-chain marker in frames.
//!
//! # Concurrency
//!
//! A [`DayFile`] guards all I/O with one mutex. Appends and traversals never
//! interleave on the same file, so a reader cannot observe a partially
//! linked chain.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};
use parking_lot::Mutex;

use crate::codec::RecordCodec;
use crate::error::{DayFileError, Result};
use crate::timeline::SECONDS_PER_DAY;

/// Sentinel at the start of every day file.
pub const DAY_FILE_MAGIC: u64 = 7_089_841_687_217_925_715;

/// Size of the file header in bytes.
pub const HEADER_SIZE: u64 = 16;

/// Size of one index table entry in bytes.
pub const SLOT_SIZE: u64 = 8;

/// Number of index table entries, one per second of the day.
pub const SLOTS_PER_DAY: usize = 86_400;

/// Size of the index table in bytes.
pub const INDEX_TABLE_SIZE: u64 = SLOTS_PER_DAY as u64 * SLOT_SIZE;

/// Offset of the first byte of the data region.
pub const DATA_REGION_OFFSET: u64 = HEADER_SIZE + INDEX_TABLE_SIZE;

/// Size of the fixed part of a record frame.
pub const FRAME_HEADER_SIZE: u64 = 16;

/// Index table entry: head and tail of one second's chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SecondSlot {
    /// Offset of the first frame, 0 if the chain is empty.
    pub first: u32,
    /// Offset of the last frame, 0 if the chain is empty.
    pub last: u32,
}

impl SecondSlot {
    /// Returns true if no record was written at this second.
    pub fn is_empty(&self) -> bool {
        self.first == 0
    }

    fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            first: read_u32(&bytes[0..4]),
            last: read_u32(&bytes[4..8]),
        }
    }

    fn to_bytes(self) -> [u8; 8] {
        let mut buf = [0u8; 8];
        buf[0..4].copy_from_slice(&self.first.to_le_bytes());
        buf[4..8].copy_from_slice(&self.last.to_le_bytes());
        buf
    }
}

/// Fixed part of an on-disk record frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Offset of this frame in the file.
    pub offset: u32,
    /// Second the frame was written under.
    pub timestamp: i64,
    /// Offset of the next frame of the chain, 0 at the tail.
    pub next: u32,
    /// Payload length in bytes.
    pub len: u32,
}

impl FrameHeader {
    fn from_bytes(offset: u32, bytes: &[u8; 16]) -> Self {
        Self {
            offset,
            timestamp: i64::from_le_bytes(bytes[0..8].try_into().unwrap_or_default()),
            next: read_u32(&bytes[8..12]),
            len: read_u32(&bytes[12..16]),
        }
    }

    fn encode_into(buf: &mut Vec<u8>, timestamp: i64, next: u32, payload: &[u8]) {
        buf.extend_from_slice(&timestamp.to_le_bytes());
        buf.extend_from_slice(&next.to_le_bytes());
        // Payload lengths are bounded by the capacity check in `append`.
        buf.extend_from_slice(&u32::try_from(payload.len()).unwrap_or(u32::MAX).to_le_bytes());
        buf.extend_from_slice(payload);
    }

    /// Offset one past the end of this frame's payload.
    fn end(&self) -> u64 {
        u64::from(self.offset) + FRAME_HEADER_SIZE + u64::from(self.len)
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes(bytes.try_into().unwrap_or_default())
}

/// Live state of an open day file.
#[derive(Debug)]
struct OpenFile {
    file: File,
    /// Mapping of the header and index table.
    index: MmapMut,
    /// Current end of the data region.
    end: u64,
}

impl OpenFile {
    /// Maps the header and index table of `file`.
    fn map(file: File, path: &Path) -> Result<Self> {
        let end = file
            .metadata()
            .map_err(|e| DayFileError::ReadFailed {
                path: path.to_path_buf(),
                offset: 0,
                source: e,
            })?
            .len();

        if end < DATA_REGION_OFFSET {
            return Err(DayFileError::Corrupted {
                path: path.to_path_buf(),
                reason: format!(
                    "file too small: {end} bytes, expected at least {DATA_REGION_OFFSET}"
                ),
            }
            .into());
        }

        #[allow(clippy::cast_possible_truncation)] // DATA_REGION_OFFSET is a small constant
        let map_len = DATA_REGION_OFFSET as usize;
        // SAFETY: The file is open read/write and at least `map_len` bytes long.
        // The mapped range only covers the header and index table, which never
        // change size, and every access goes through the owning DayFile's lock.
        let index = unsafe {
            MmapOptions::new()
                .len(map_len)
                .map_mut(&file)
                .map_err(|e| DayFileError::MemoryMap {
                    path: path.to_path_buf(),
                    source: e,
                })?
        };

        Ok(Self { file, index, end })
    }

    fn magic(&self) -> u64 {
        u64::from_le_bytes(self.index[0..8].try_into().unwrap_or_default())
    }

    fn baseline(&self) -> i64 {
        i64::from_le_bytes(self.index[8..16].try_into().unwrap_or_default())
    }

    fn read_slot(&self, index: usize) -> SecondSlot {
        let offset = slot_position(index);
        SecondSlot::from_bytes(&self.index[offset..offset + 8])
    }

    fn write_slot(&mut self, index: usize, slot: SecondSlot) {
        let offset = slot_position(index);
        self.index[offset..offset + 8].copy_from_slice(&slot.to_bytes());
    }

    fn read_at(&mut self, path: &Path, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.read_exact(buf))
            .map_err(|e| {
                DayFileError::ReadFailed {
                    path: path.to_path_buf(),
                    offset,
                    source: e,
                }
                .into()
            })
    }

    fn write_at(&mut self, path: &Path, offset: u64, buf: &[u8]) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.write_all(buf))
            .map_err(|e| {
                DayFileError::WriteFailed {
                    path: path.to_path_buf(),
                    offset,
                    source: e,
                }
                .into()
            })
    }

    /// Collects the frame headers of the chain rooted in `slot`.
    ///
    /// Stops early, keeping what was read so far, if the chain leaves the
    /// data region, runs backwards, or carries a foreign timestamp.
    fn chain(&mut self, path: &Path, second: i64, slot: SecondSlot) -> Result<Vec<FrameHeader>> {
        let mut frames = Vec::new();
        let mut offset = slot.first;

        while offset != 0 {
            let position = u64::from(offset);
            if position < DATA_REGION_OFFSET || position + FRAME_HEADER_SIZE > self.end {
                tracing::warn!(
                    path = %path.display(),
                    second,
                    offset,
                    "chain points outside the data region, stopping traversal"
                );
                break;
            }

            let mut raw = [0u8; 16];
            self.read_at(path, position, &mut raw)?;
            let header = FrameHeader::from_bytes(offset, &raw);

            if header.timestamp != second {
                tracing::warn!(
                    path = %path.display(),
                    second,
                    offset,
                    found = header.timestamp,
                    "chain timestamp mismatch, stopping traversal"
                );
                break;
            }

            if header.end() > self.end {
                tracing::warn!(
                    path = %path.display(),
                    second,
                    offset,
                    len = header.len,
                    "frame payload runs past end of file, stopping traversal"
                );
                break;
            }

            frames.push(header);

            if header.next != 0 && header.next <= offset {
                tracing::warn!(
                    path = %path.display(),
                    second,
                    offset,
                    next = header.next,
                    "chain link points backwards, stopping traversal"
                );
                break;
            }
            offset = header.next;
        }

        Ok(frames)
    }

    fn read_payload(&mut self, path: &Path, header: &FrameHeader) -> Result<Vec<u8>> {
        let mut payload = vec![0u8; header.len as usize];
        self.read_at(
            path,
            u64::from(header.offset) + FRAME_HEADER_SIZE,
            &mut payload,
        )?;
        Ok(payload)
    }

    fn decode_chain<R: RecordCodec>(
        &mut self,
        path: &Path,
        second: i64,
        slot: SecondSlot,
    ) -> Result<Vec<R>> {
        let frames = self.chain(path, second, slot)?;
        let mut records = Vec::with_capacity(frames.len());
        for header in &frames {
            let payload = self.read_payload(path, header)?;
            records.push(R::decode(&payload)?);
        }
        Ok(records)
    }

    fn sync(&self, path: &Path) -> Result<()> {
        self.index
            .flush()
            .and_then(|()| self.file.sync_all())
            .map_err(|e| {
                DayFileError::SyncFailed {
                    path: path.to_path_buf(),
                    source: e,
                }
                .into()
            })
    }
}

/// Byte position of the slot for second-of-day `index`.
fn slot_position(index: usize) -> usize {
    #[allow(clippy::cast_possible_truncation)] // HEADER_SIZE and SLOT_SIZE are tiny constants
    let (header, slot) = (HEADER_SIZE as usize, SLOT_SIZE as usize);
    header + index * slot
}

/// One calendar day of records in a single file.
///
/// # Thread Safety
///
/// `DayFile` is `Send + Sync`; every operation takes the file's lock for its
/// whole duration. Once [`close`](Self::close)d, every operation fails with
/// [`DayFileError::Closed`].
#[derive(Debug)]
pub struct DayFile {
    path: PathBuf,
    baseline: i64,
    inner: Mutex<Option<OpenFile>>,
}

impl DayFile {
    /// Creates a new day file for the day starting at `baseline`.
    ///
    /// The header and the complete zeroed index table are written in one pass
    /// before the file is handed out, so no reader ever sees a partial table.
    ///
    /// # Errors
    ///
    /// Returns [`DayFileError::WriteFailed`] if the file already exists or
    /// cannot be written, or [`DayFileError::MemoryMap`] if mapping fails.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use daystore::dayfile::DayFile;
    ///
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let day = DayFile::create("1672531200.bin", 1_672_531_200)?;
    /// day.append(1_672_531_205, &["first".to_string(), "second".to_string()])?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn create<P: AsRef<Path>>(path: P, baseline: i64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let write_failed = |e| DayFileError::WriteFailed {
            path: path.clone(),
            offset: 0,
            source: e,
        };

        let mut file = OpenOptions::new()
            .create_new(true)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(write_failed)?;

        #[allow(clippy::cast_possible_truncation)] // DATA_REGION_OFFSET is a small constant
        let mut image = vec![0u8; DATA_REGION_OFFSET as usize];
        image[0..8].copy_from_slice(&DAY_FILE_MAGIC.to_le_bytes());
        image[8..16].copy_from_slice(&baseline.to_le_bytes());
        file.write_all(&image)
            .and_then(|()| file.sync_all())
            .map_err(write_failed)?;

        let inner = OpenFile::map(file, &path)?;
        tracing::debug!(path = %path.display(), baseline, "created day file");

        Ok(Self {
            path,
            baseline,
            inner: Mutex::new(Some(inner)),
        })
    }

    /// Opens an existing day file without reinitialising it.
    ///
    /// # Errors
    ///
    /// Returns [`DayFileError::ReadFailed`] if the file cannot be opened, or
    /// [`DayFileError::Corrupted`] if it is too small or its magic is wrong.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| DayFileError::ReadFailed {
                path: path.clone(),
                offset: 0,
                source: e,
            })?;

        let inner = OpenFile::map(file, &path)?;
        if inner.magic() != DAY_FILE_MAGIC {
            return Err(DayFileError::Corrupted {
                path,
                reason: format!(
                    "invalid magic: expected {DAY_FILE_MAGIC:#018x}, found {:#018x}",
                    inner.magic()
                ),
            }
            .into());
        }

        let baseline = inner.baseline();
        tracing::debug!(path = %path.display(), baseline, "opened day file");

        Ok(Self {
            path,
            baseline,
            inner: Mutex::new(Some(inner)),
        })
    }

    /// Returns the day baseline stored in the header.
    pub fn baseline(&self) -> i64 {
        self.baseline
    }

    /// Returns the path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true once the file has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().is_none()
    }

    /// Returns true if `second` lies in this file's window.
    pub fn covers(&self, second: i64) -> bool {
        self.slot_index(second).is_ok()
    }

    /// Maps a unix second to its index table position.
    fn slot_index(&self, second: i64) -> Result<usize> {
        second
            .checked_sub(self.baseline)
            .filter(|delta| (0..SECONDS_PER_DAY).contains(delta))
            .and_then(|delta| usize::try_from(delta).ok())
            .ok_or_else(|| {
                DayFileError::OutOfRange {
                    second,
                    baseline: self.baseline,
                }
                .into()
            })
    }

    /// Runs `f` against the open state, failing if the file was closed.
    fn with_open<T>(&self, f: impl FnOnce(&mut OpenFile) -> Result<T>) -> Result<T> {
        let mut guard = self.inner.lock();
        let open = guard.as_mut().ok_or_else(|| DayFileError::Closed {
            path: self.path.clone(),
        })?;
        f(open)
    }

    /// Reads the index table entry for `second`.
    ///
    /// # Errors
    ///
    /// Returns [`DayFileError::OutOfRange`] outside the day window, or
    /// [`DayFileError::Closed`].
    pub fn read_slot(&self, second: i64) -> Result<SecondSlot> {
        let index = self.slot_index(second)?;
        self.with_open(|open| Ok(open.read_slot(index)))
    }

    /// Appends a batch of records under `second`.
    ///
    /// The batch is encoded up front, written as one contiguous run of
    /// frames already linked to each other, then attached to the tail of the
    /// existing chain. The index slot is updated last, once per batch, so the
    /// new frames only become reachable after they are fully linked.
    ///
    /// An empty batch is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`DayFileError::OutOfRange`], [`DayFileError::Closed`],
    /// [`DayFileError::CapacityExceeded`], a codec error, or an I/O error.
    pub fn append<R: RecordCodec>(&self, second: i64, records: &[R]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let index = self.slot_index(second)?;

        let payloads = records
            .iter()
            .map(RecordCodec::encode)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let needed: u64 = payloads
            .iter()
            .map(|p| FRAME_HEADER_SIZE + p.len() as u64)
            .sum();

        self.with_open(|open| {
            let start = open.end;
            let too_big = || DayFileError::CapacityExceeded {
                path: self.path.clone(),
                offset: start,
                needed,
            };
            let first = u32::try_from(start).map_err(|_| too_big())?;
            if start + needed > u64::from(u32::MAX) {
                return Err(too_big().into());
            }

            // Offsets below are bounded by the capacity check above.
            let mut batch = Vec::with_capacity(usize::try_from(needed).unwrap_or_default());
            let mut last = first;
            for (i, payload) in payloads.iter().enumerate() {
                let offset = start + batch.len() as u64;
                let frame_end = offset + FRAME_HEADER_SIZE + payload.len() as u64;
                let next = if i + 1 < payloads.len() {
                    u32::try_from(frame_end).map_err(|_| too_big())?
                } else {
                    0
                };
                last = u32::try_from(offset).map_err(|_| too_big())?;
                FrameHeader::encode_into(&mut batch, second, next, payload);
            }

            let mut slot = open.read_slot(index);
            open.write_at(&self.path, start, &batch)?;
            open.end = start + needed;

            if slot.last != 0 {
                open.write_at(&self.path, u64::from(slot.last) + 8, &first.to_le_bytes())?;
            }
            if slot.first == 0 {
                slot.first = first;
            }
            slot.last = last;
            open.write_slot(index, slot);

            Ok(())
        })
    }

    /// Returns every record written at `second`, in write order.
    ///
    /// A chain that turns out to be corrupted yields the records read before
    /// the damage; the problem is logged rather than returned.
    ///
    /// # Errors
    ///
    /// Returns [`DayFileError::OutOfRange`], [`DayFileError::Closed`], a codec
    /// error, or an I/O error.
    pub fn traverse<R: RecordCodec>(&self, second: i64) -> Result<Vec<R>> {
        let index = self.slot_index(second)?;
        self.with_open(|open| {
            let slot = open.read_slot(index);
            if slot.is_empty() {
                return Ok(Vec::new());
            }
            open.decode_chain(&self.path, second, slot)
        })
    }

    /// Returns the records of every populated second in `[begin, end]`,
    /// clamped to this file's window, under a single lock acquisition.
    ///
    /// Seconds without records are omitted.
    ///
    /// # Errors
    ///
    /// Returns [`DayFileError::Closed`], a codec error, or an I/O error.
    pub fn seconds_with_data<R: RecordCodec>(
        &self,
        begin: i64,
        end: i64,
    ) -> Result<Vec<(i64, Vec<R>)>> {
        let first = begin.max(self.baseline);
        let last = end.min(self.baseline.saturating_add(SECONDS_PER_DAY - 1));

        self.with_open(|open| {
            let mut out = Vec::new();
            for second in first..=last {
                let index = self.slot_index(second)?;
                let slot = open.read_slot(index);
                if slot.is_empty() {
                    continue;
                }
                let records = open.decode_chain::<R>(&self.path, second, slot)?;
                if !records.is_empty() {
                    out.push((second, records));
                }
            }
            Ok(out)
        })
    }

    /// Returns the unix seconds of this day that hold at least one record.
    ///
    /// # Errors
    ///
    /// Returns [`DayFileError::Closed`].
    pub fn populated_seconds(&self) -> Result<Vec<i64>> {
        self.with_open(|open| {
            Ok((0..SLOTS_PER_DAY)
                .filter(|&index| !open.read_slot(index).is_empty())
                .map(|index| self.baseline + index as i64)
                .collect())
        })
    }

    /// Returns the on-disk frame headers of the chain at `second`.
    ///
    /// # Errors
    ///
    /// Returns [`DayFileError::OutOfRange`], [`DayFileError::Closed`], or an
    /// I/O error.
    pub fn frames(&self, second: i64) -> Result<Vec<FrameHeader>> {
        let index = self.slot_index(second)?;
        self.with_open(|open| {
            let slot = open.read_slot(index);
            open.chain(&self.path, second, slot)
        })
    }

    /// Flushes the index table and file contents to disk.
    ///
    /// # Errors
    ///
    /// Returns [`DayFileError::Closed`] or [`DayFileError::SyncFailed`].
    pub fn sync(&self) -> Result<()> {
        self.with_open(|open| open.sync(&self.path))
    }

    /// Flushes and releases the file handle.
    ///
    /// Waits for any in-flight append or traversal to finish first.
    ///
    /// # Errors
    ///
    /// Returns [`DayFileError::Closed`] if already closed, or
    /// [`DayFileError::SyncFailed`] if the final flush fails (the handle is
    /// released regardless).
    pub fn close(&self) -> Result<()> {
        let open = self.inner.lock().take().ok_or_else(|| DayFileError::Closed {
            path: self.path.clone(),
        })?;
        tracing::debug!(path = %self.path.display(), baseline = self.baseline, "closing day file");
        open.sync(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const BASELINE: i64 = 1_672_531_200; // 2023-01-01T00:00:00Z

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    fn new_day(dir: &tempfile::TempDir) -> (PathBuf, DayFile) {
        let path = dir.path().join(format!("{BASELINE}.bin"));
        let day = DayFile::create(&path, BASELINE).unwrap();
        (path, day)
    }

    #[test]
    fn test_layout_constants() {
        assert_eq!(INDEX_TABLE_SIZE, 691_200);
        assert_eq!(DATA_REGION_OFFSET, 691_216);
        assert_eq!(slot_position(0), 16);
        assert_eq!(slot_position(86_399), 16 + 86_399 * 8);
    }

    #[test]
    fn test_create_writes_header_and_zeroed_index() {
        let dir = tempfile::tempdir().unwrap();
        let (path, day) = new_day(&dir);
        day.close().unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len() as u64, DATA_REGION_OFFSET);
        assert_eq!(u64::from_le_bytes(bytes[0..8].try_into().unwrap()), DAY_FILE_MAGIC);
        assert_eq!(i64::from_le_bytes(bytes[8..16].try_into().unwrap()), BASELINE);
        assert!(bytes[16..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let (path, _day) = new_day(&dir);
        assert!(DayFile::create(&path, BASELINE).is_err());
    }

    #[test]
    fn test_open_validates_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.bin");
        fs::write(&path, vec![0u8; DATA_REGION_OFFSET as usize]).unwrap();

        let err = DayFile::open(&path).unwrap_err();
        assert!(err.to_string().contains("invalid magic"));
    }

    #[test]
    fn test_open_rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.bin");
        fs::write(&path, DAY_FILE_MAGIC.to_le_bytes()).unwrap();

        let err = DayFile::open(&path).unwrap_err();
        assert!(err.to_string().contains("file too small"));
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(DayFile::open(dir.path().join("nope.bin")).is_err());
    }

    #[test]
    fn test_slot_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let (_path, day) = new_day(&dir);

        assert!(day.read_slot(BASELINE).unwrap().is_empty());
        assert!(day.read_slot(BASELINE + 86_399).unwrap().is_empty());

        let err = day.read_slot(BASELINE + 86_400).unwrap_err();
        assert!(err.is_out_of_range());
        let err = day.read_slot(BASELINE - 1).unwrap_err();
        assert!(err.is_out_of_range());
        assert!(day.append(BASELINE - 1, &strings(&["x"])).unwrap_err().is_out_of_range());
        assert!(day.traverse::<String>(i64::MIN).unwrap_err().is_out_of_range());
    }

    #[test]
    fn test_append_then_traverse_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let (_path, day) = new_day(&dir);
        let second = BASELINE + 5;

        day.append(second, &strings(&["A", "B"])).unwrap();
        day.append(second, &strings(&["C"])).unwrap();

        assert_eq!(day.traverse::<String>(second).unwrap(), strings(&["A", "B", "C"]));
        assert!(day.traverse::<String>(second + 1).unwrap().is_empty());
    }

    #[test]
    fn test_batch_is_linked_contiguously() {
        let dir = tempfile::tempdir().unwrap();
        let (_path, day) = new_day(&dir);
        let second = BASELINE + 60;

        day.append(second, &strings(&["aa", "bbb", "c"])).unwrap();

        let slot = day.read_slot(second).unwrap();
        assert_eq!(u64::from(slot.first), DATA_REGION_OFFSET);

        let frames = day.frames(second).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].next, frames[1].offset);
        assert_eq!(frames[1].next, frames[2].offset);
        assert_eq!(frames[2].next, 0);
        assert_eq!(u64::from(frames[1].offset), u64::from(frames[0].offset) + 16 + 2);
        assert_eq!(slot.last, frames[2].offset);
        assert!(frames.iter().all(|f| f.timestamp == second));
    }

    #[test]
    fn test_chain_integrity_across_interleaved_seconds() {
        let dir = tempfile::tempdir().unwrap();
        let (_path, day) = new_day(&dir);
        let a = BASELINE + 100;
        let b = BASELINE + 200;

        let batches = [1usize, 3, 2, 5];
        for (i, size) in batches.iter().enumerate() {
            let batch: Vec<String> = (0..*size).map(|j| format!("a{i}-{j}")).collect();
            day.append(a, &batch).unwrap();
            day.append(b, &strings(&["noise"])).unwrap();
        }

        let frames = day.frames(a).unwrap();
        assert_eq!(frames.len(), batches.iter().sum::<usize>());
        assert_eq!(frames.last().unwrap().next, 0);
        assert!(frames.windows(2).all(|w| w[0].next == w[1].offset));
        assert_eq!(day.frames(b).unwrap().len(), batches.len());
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let (path, day) = new_day(&dir);

        day.append::<String>(BASELINE, &[]).unwrap();
        assert!(day.read_slot(BASELINE).unwrap().is_empty());
        day.close().unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), DATA_REGION_OFFSET);
    }

    #[test]
    fn test_reopen_reproduces_results() {
        let dir = tempfile::tempdir().unwrap();
        let (path, day) = new_day(&dir);

        for i in 0..50 {
            let second = BASELINE + i * 17;
            day.append(second, &[format!("rec-{i}-0"), format!("rec-{i}-1")]).unwrap();
        }
        let before: Vec<Vec<String>> = (0..50)
            .map(|i| day.traverse(BASELINE + i * 17).unwrap())
            .collect();
        day.close().unwrap();

        let reopened = DayFile::open(&path).unwrap();
        assert_eq!(reopened.baseline(), BASELINE);
        let after: Vec<Vec<String>> = (0..50)
            .map(|i| reopened.traverse(BASELINE + i * 17).unwrap())
            .collect();
        assert_eq!(before, after);

        // Appends after reopen continue the existing chains.
        reopened.append(BASELINE, &strings(&["late"])).unwrap();
        assert_eq!(
            reopened.traverse::<String>(BASELINE).unwrap(),
            strings(&["rec-0-0", "rec-0-1", "late"])
        );
    }

    #[test]
    fn test_timestamp_mismatch_returns_partial_chain() {
        let dir = tempfile::tempdir().unwrap();
        let (path, day) = new_day(&dir);
        let second = BASELINE + 42;

        day.append(second, &strings(&["A"])).unwrap();
        day.append(second, &strings(&["B"])).unwrap();
        day.append(second, &strings(&["C"])).unwrap();
        let frames = day.frames(second).unwrap();
        day.close().unwrap();

        // Corrupt the timestamp of the second frame.
        let mut bytes = fs::read(&path).unwrap();
        let at = frames[1].offset as usize;
        bytes[at..at + 8].copy_from_slice(&(second + 1).to_le_bytes());
        fs::write(&path, bytes).unwrap();

        let day = DayFile::open(&path).unwrap();
        assert_eq!(day.traverse::<String>(second).unwrap(), strings(&["A"]));
    }

    #[test]
    fn test_backward_link_terminates() {
        let dir = tempfile::tempdir().unwrap();
        let (path, day) = new_day(&dir);
        let second = BASELINE + 7;

        day.append(second, &strings(&["A", "B"])).unwrap();
        let frames = day.frames(second).unwrap();
        day.close().unwrap();

        // Point the tail back at the head.
        let mut bytes = fs::read(&path).unwrap();
        let at = frames[1].offset as usize + 8;
        bytes[at..at + 4].copy_from_slice(&frames[0].offset.to_le_bytes());
        fs::write(&path, bytes).unwrap();

        let day = DayFile::open(&path).unwrap();
        assert_eq!(day.traverse::<String>(second).unwrap(), strings(&["A", "B"]));
    }

    #[test]
    fn test_seconds_with_data_clamps_to_window() {
        let dir = tempfile::tempdir().unwrap();
        let (_path, day) = new_day(&dir);

        day.append(BASELINE + 5, &strings(&["x"])).unwrap();
        day.append(BASELINE + 43_200, &strings(&["y", "z"])).unwrap();

        let all = day
            .seconds_with_data::<String>(BASELINE - 1000, BASELINE + 200_000)
            .unwrap();
        assert_eq!(
            all,
            vec![
                (BASELINE + 5, strings(&["x"])),
                (BASELINE + 43_200, strings(&["y", "z"])),
            ]
        );

        let tail = day.seconds_with_data::<String>(BASELINE + 6, BASELINE + 86_399).unwrap();
        assert_eq!(tail.len(), 1);

        let outside = day.seconds_with_data::<String>(BASELINE + 90_000, BASELINE + 95_000).unwrap();
        assert!(outside.is_empty());
    }

    #[test]
    fn test_populated_seconds() {
        let dir = tempfile::tempdir().unwrap();
        let (_path, day) = new_day(&dir);

        day.append(BASELINE + 86_399, &strings(&["last"])).unwrap();
        day.append(BASELINE, &strings(&["first"])).unwrap();

        assert_eq!(day.populated_seconds().unwrap(), vec![BASELINE, BASELINE + 86_399]);
    }

    #[test]
    fn test_operations_after_close_fail() {
        let dir = tempfile::tempdir().unwrap();
        let (_path, day) = new_day(&dir);
        day.close().unwrap();

        assert!(day.is_closed());
        assert!(day.close().unwrap_err().is_closed());
        assert!(day.traverse::<String>(BASELINE).unwrap_err().is_closed());
        assert!(day.append(BASELINE, &strings(&["x"])).unwrap_err().is_closed());
        assert!(day.read_slot(BASELINE).unwrap_err().is_closed());
    }

    #[test]
    fn test_decode_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let (_path, day) = new_day(&dir);

        day.append(BASELINE, &[vec![0xffu8, 0xfe]]).unwrap();
        let err = day.traverse::<String>(BASELINE).unwrap_err();
        assert!(err.to_string().contains("codec error"));
    }
}
