use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Encode a single event to [len][bincode][crc32] format.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Read exactly `buf.len()` bytes. `Ok(false)` means the log ended first.
fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Append-only ledger log.
///
/// Format per entry: `[u32: len][bincode: Event][u32: crc32]`
/// - `len` is the byte length of the bincode payload (not including the CRC).
/// - A torn last entry (crash mid-write) is discarded on replay.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    /// Open (or create) the WAL file at `path`.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Append one event and fsync. Production code goes through
    /// `append_buffered` + `flush_sync` so a batch shares one fsync.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_event(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    /// Flush the BufWriter and fsync the underlying file.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the compacted event set to a sibling temp file and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let tmp_path = path.with_extension("wal.tmp");
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    /// Rename the temp file over the WAL and reopen it for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
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

    /// Replay the WAL from disk, returning every intact event in order.
    /// Replay stops at the first truncated or corrupt entry.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();

        loop {
            let mut len_buf = [0u8; 4];
            if !read_or_eof(&mut reader, &mut len_buf)? {
                break;
            }
            let len = u32::from_le_bytes(len_buf) as usize;

            let mut payload = vec![0u8; len];
            let mut crc_buf = [0u8; 4];
            if !read_or_eof(&mut reader, &mut payload)? || !read_or_eof(&mut reader, &mut crc_buf)? {
                tracing::warn!(path = %path.display(), replayed = events.len(), "discarding truncated WAL tail");
                break;
            }

            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                tracing::warn!(path = %path.display(), replayed = events.len(), "WAL checksum mismatch, stopping replay");
                break;
            }

            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!(path = %path.display(), "undecodable WAL entry: {e}");
                    break;
                }
            }
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use ulid::Ulid;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("loadline_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn person_created(id: Ulid) -> Event {
        Event::PersonCreated(Person {
            id,
            name: "Grace".into(),
            role: Role::Engineer,
            skills: vec!["COBOL".into()],
            seniority: Some(Seniority::Senior),
            department: "Engineering".into(),
            max_capacity: 100,
        })
    }

    fn engagement_created(person_id: Ulid) -> Event {
        Event::EngagementCreated(Engagement {
            id: Ulid::new(),
            person_id,
            project_id: Ulid::new(),
            allocation: 40,
            span: Span::new(1000, 2000),
            role: "Developer".into(),
            version: 1,
        })
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let pid = Ulid::new();
        let events = vec![person_created(pid), engagement_created(pid)];

        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append(e).unwrap();
            }
        }

        assert_eq!(Wal::replay(&path).unwrap(), events);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_drops_torn_tail() {
        let path = tmp_path("torn_tail.wal");
        let event = person_created(Ulid::new());

        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&event).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[7u8, 0, 0, 0, 1, 2]).unwrap();
        }

        assert_eq!(Wal::replay(&path).unwrap(), vec![event]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn replay_missing_file_is_empty() {
        let path = tmp_path("never_written.wal");
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn replay_stops_at_bad_checksum() {
        let path = tmp_path("bad_crc.wal");
        let good = person_created(Ulid::new());
        let bad = Event::ProjectDeleted { id: Ulid::new() };

        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&good).unwrap();
        }
        {
            let payload = bincode::serialize(&bad).unwrap();
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEAD_BEEFu32.to_le_bytes()).unwrap();
        }

        assert_eq!(Wal::replay(&path).unwrap(), vec![good]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn compaction_shrinks_and_keeps_appending() {
        let path = tmp_path("compact.wal");
        let pid = Ulid::new();
        let keep = person_created(pid);

        let mut wal = Wal::open(&path).unwrap();
        wal.append(&keep).unwrap();
        for _ in 0..10 {
            let Event::EngagementCreated(e) = engagement_created(pid) else {
                unreachable!()
            };
            wal.append(&Event::EngagementCreated(e.clone())).unwrap();
            wal.append(&Event::EngagementDeleted {
                id: e.id,
                person_id: pid,
                project_id: e.project_id,
            })
            .unwrap();
        }
        let before = fs::metadata(&path).unwrap().len();

        wal.compact(std::slice::from_ref(&keep)).unwrap();
        assert_eq!(wal.appends_since_compact(), 0);
        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "compacted WAL should be smaller: {after} < {before}");

        let next = engagement_created(pid);
        wal.append(&next).unwrap();
        drop(wal);

        assert_eq!(Wal::replay(&path).unwrap(), vec![keep, next]);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn buffered_appends_count_until_flushed() {
        let path = tmp_path("buffered.wal");
        let events: Vec<Event> = (0..5).map(|_| person_created(Ulid::new())).collect();

        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append_buffered(e).unwrap();
            }
            assert_eq!(wal.appends_since_compact(), 5);
            wal.flush_sync().unwrap();
        }

        assert_eq!(Wal::replay(&path).unwrap(), events);
        let _ = fs::remove_file(&path);
    }
}
