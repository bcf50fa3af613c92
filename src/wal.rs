use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Upper bound on a single record; a larger length prefix is treated as corruption.
const MAX_RECORD_LEN: usize = 1 << 20;

/// Write one record as `[len][bincode][crc32]`.
fn write_record(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "record too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Read exactly `buf.len()` bytes. `Ok(false)` means the log ended first.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Read the next intact record and its size on disk. `Ok(None)` at end of log
/// or at the first torn/corrupt record, after which nothing is trusted.
fn read_record(reader: &mut impl Read) -> io::Result<Option<(Event, u64)>> {
    let mut word = [0u8; 4];
    if !read_full(reader, &mut word)? {
        return Ok(None);
    }
    let len = u32::from_le_bytes(word) as usize;
    if len > MAX_RECORD_LEN {
        tracing::warn!("booking log: record length {len} out of range, discarding tail");
        return Ok(None);
    }
    let mut payload = vec![0u8; len];
    if !read_full(reader, &mut payload)? || !read_full(reader, &mut word)? {
        return Ok(None);
    }
    if crc32fast::hash(&payload) != u32::from_le_bytes(word) {
        tracing::warn!("booking log: crc mismatch, discarding tail");
        return Ok(None);
    }
    match bincode::deserialize(&payload) {
        Ok(event) => Ok(Some((event, (len + 8) as u64))),
        Err(e) => {
            tracing::warn!("booking log: undecodable record ({e}), discarding tail");
            Ok(None)
        }
    }
}

/// Append-only booking log.
///
/// Format per record: `[u32: len][bincode: Event][u32: crc32]`, little endian.
/// A torn final record (crash mid-write) is dropped on replay.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Buffer a record. Not durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        write_record(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    /// Flush buffered records and fsync.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Rewrite the log as `events`: write a sibling temp file, fsync, rename over.
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        self.flush_sync()?;
        let tmp_path = self.path.with_extension("wal.tmp");
        {
            let mut tmp = BufWriter::new(File::create(&tmp_path)?);
            for event in events {
                write_record(&mut tmp, event)?;
            }
            tmp.flush()?;
            tmp.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Every intact record in the log, oldest first. Missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        Ok(Self::scan(path)?.0)
    }

    /// Replay the log, cut off a torn or corrupt tail, and open it for appending.
    /// Without the cut, new records would land behind bytes replay never gets past.
    pub fn recover(path: &Path) -> io::Result<(Self, Vec<Event>)> {
        let (events, intact_len) = Self::scan(path)?;
        match fs::metadata(path) {
            Ok(meta) if meta.len() > intact_len => {
                tracing::warn!(
                    "booking log: truncating {} unreadable bytes from {}",
                    meta.len() - intact_len,
                    path.display()
                );
                let file = OpenOptions::new().write(true).open(path)?;
                file.set_len(intact_len)?;
                file.sync_all()?;
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        Ok((Self::open(path)?, events))
    }

    /// Intact records plus the byte length of the prefix holding them.
    fn scan(path: &Path) -> io::Result<(Vec<Event>, u64)> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        let mut intact_len = 0;
        while let Some((event, size)) = read_record(&mut reader)? {
            events.push(event);
            intact_len += size;
        }
        Ok((events, intact_len))
    }
}
