use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Larger length prefixes can only come from a torn or corrupt header.
const MAX_RECORD_LEN: usize = 16 * 1024 * 1024;

/// Frame one event as `[len][bincode][crc32]`.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if payload.len() > MAX_RECORD_LEN {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "event too large"));
    }
    writer.write_all(&(payload.len() as u32).to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// `Ok(false)` on a clean or torn end of file.
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Next intact event and its framed size, or `None` at the first torn or
/// corrupt record.
fn decode_event(reader: &mut impl Read) -> io::Result<Option<(Event, u64)>> {
    let mut len_buf = [0u8; 4];
    if !read_exact_or_eof(reader, &mut len_buf)? {
        return Ok(None);
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_RECORD_LEN {
        return Ok(None);
    }
    let mut payload = vec![0u8; len];
    if !read_exact_or_eof(reader, &mut payload)? {
        return Ok(None);
    }
    let mut crc_buf = [0u8; 4];
    if !read_exact_or_eof(reader, &mut crc_buf)? {
        return Ok(None);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    let framed = 8 + payload.len() as u64;
    Ok(bincode::deserialize::<Event>(&payload)
        .ok()
        .map(|event| (event, framed)))
}

/// Append-only log of committed room, principal and reservation events.
///
/// Each record is `[u32 len][bincode Event][u32 crc32]`. A crash can leave a
/// torn last record; replay stops there and keeps everything before it, and
/// `recover` cuts the torn bytes off before the log is reopened.
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

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer one event. Nothing is durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_event(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn compact_tmp_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write the snapshot events to a side file and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::compact_tmp_path(path))?);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the side file over the log and reopen it for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(Self::compact_tmp_path(&self.path), &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Every intact event in file order. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        Self::read_intact(path).map(|(events, _)| events)
    }

    /// Replay, then cut the file back to its last intact record so later
    /// appends are not written behind bytes that replay would stop at.
    pub fn recover(path: &Path) -> io::Result<Vec<Event>> {
        let (events, intact_len) = Self::read_intact(path)?;
        let file_len = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(events),
            Err(e) => return Err(e),
        };
        if file_len > intact_len {
            tracing::warn!(
                path = %path.display(),
                dropped_bytes = file_len - intact_len,
                "truncating torn WAL tail"
            );
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(intact_len)?;
            file.sync_all()?;
        }
        Ok(events)
    }

    /// Intact events plus the byte length they occupy from the start of the file.
    fn read_intact(path: &Path) -> io::Result<(Vec<Event>, u64)> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        let mut intact_len = 0;
        while let Some((event, framed)) = decode_event(&mut reader)? {
            events.push(event);
            intact_len += framed;
        }
        Ok((events, intact_len))
    }
}
