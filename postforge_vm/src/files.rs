//! The out-of-VM file registry.
//!
//! OS streams cannot participate in VM snapshots, so a file object is just
//! a `FileId` into this side registry; `save`/`restore` copy the id and
//! nothing else. `%stdin`, `%stdout`, and `%stderr` resolve here, and hosts
//! (or tests) may swap the standard streams for arbitrary `Read`/`Write`
//! implementations.

use postforge_core::{ErrorKind, FileId, PsResult};
use rustc_hash::FxHashMap;
use std::fs;
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};

/// The underlying byte source/sink of one registered file.
pub enum StreamKind {
    Reader(Box<dyn Read>),
    Writer(Box<dyn Write>),
    Disk(BufReader<fs::File>),
    DiskWrite(fs::File),
}

pub struct FileStream {
    pub name: Vec<u8>,
    pub kind: StreamKind,
    /// One byte of pushback for the tokenizer.
    pub ungot: Option<u8>,
    pub line_num: u32,
    pub closed: bool,
    pub position: u64,
}

impl FileStream {
    pub fn is_readable(&self) -> bool {
        matches!(self.kind, StreamKind::Reader(_) | StreamKind::Disk(_))
    }

    pub fn is_writable(&self) -> bool {
        matches!(self.kind, StreamKind::Writer(_) | StreamKind::DiskWrite(_))
    }

    /// Read one byte, honoring pushback.
    pub fn read_byte(&mut self) -> PsResult<Option<u8>> {
        if self.closed {
            return Ok(None);
        }
        if let Some(b) = self.ungot.take() {
            return Ok(Some(b));
        }
        let mut buf = [0u8; 1];
        let n = match &mut self.kind {
            StreamKind::Reader(r) => r.read(&mut buf),
            StreamKind::Disk(r) => r.read(&mut buf),
            _ => return Err(ErrorKind::InvalidFileAccess.into()),
        }
        .map_err(|_| ErrorKind::IoError)?;
        if n == 0 {
            Ok(None)
        } else {
            self.position += 1;
            Ok(Some(buf[0]))
        }
    }

    pub fn unread(&mut self, byte: u8) {
        self.ungot = Some(byte);
        self.position = self.position.saturating_sub(1);
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> PsResult<()> {
        if self.closed {
            return Err(ErrorKind::IoError.into());
        }
        match &mut self.kind {
            StreamKind::Writer(w) => w.write_all(bytes),
            StreamKind::DiskWrite(f) => f.write_all(bytes),
            _ => return Err(ErrorKind::InvalidFileAccess.into()),
        }
        .map_err(|_| ErrorKind::IoError)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    pub fn flush(&mut self) -> PsResult<()> {
        match &mut self.kind {
            StreamKind::Writer(w) => w.flush().map_err(|_| ErrorKind::IoError.into()),
            StreamKind::DiskWrite(f) => f.flush().map_err(|_| ErrorKind::IoError.into()),
            _ => Ok(()),
        }
    }

    /// Bytes left before EOF for seekable streams, `-1` when unknown.
    pub fn bytes_available(&mut self) -> i32 {
        match &mut self.kind {
            StreamKind::Disk(r) => {
                let here = r.stream_position().unwrap_or(0);
                let end = r.seek(SeekFrom::End(0)).unwrap_or(here);
                let _ = r.seek(SeekFrom::Start(here));
                (end - here) as i32 + self.ungot.is_some() as i32
            }
            _ => -1,
        }
    }

    pub fn seek_to(&mut self, pos: u64) -> PsResult<()> {
        match &mut self.kind {
            StreamKind::Disk(r) => {
                r.seek(SeekFrom::Start(pos)).map_err(|_| ErrorKind::IoError)?;
                self.ungot = None;
                self.position = pos;
                Ok(())
            }
            _ => Err(ErrorKind::IoError.into()),
        }
    }

    pub fn close(&mut self) {
        self.closed = true;
        self.ungot = None;
    }
}

/// Registry mapping `FileId`s to live streams.
pub struct FileRegistry {
    files: FxHashMap<u32, FileStream>,
    next_id: u32,
    pub stdin_id: FileId,
    pub stdout_id: FileId,
    pub stderr_id: FileId,
}

impl FileRegistry {
    /// Registry wired to the process's standard streams.
    pub fn with_standard_io() -> Self {
        Self::with_streams(
            Box::new(io::stdin()),
            Box::new(io::stdout()),
            Box::new(io::stderr()),
        )
    }

    /// Registry with host-supplied standard streams (tests capture stdout
    /// this way).
    pub fn with_streams(
        stdin: Box<dyn Read>,
        stdout: Box<dyn Write>,
        stderr: Box<dyn Write>,
    ) -> Self {
        let mut reg = Self {
            files: FxHashMap::default(),
            next_id: 0,
            stdin_id: FileId(0),
            stdout_id: FileId(0),
            stderr_id: FileId(0),
        };
        reg.stdin_id = reg.register(b"%stdin".to_vec(), StreamKind::Reader(stdin));
        reg.stdout_id = reg.register(b"%stdout".to_vec(), StreamKind::Writer(stdout));
        reg.stderr_id = reg.register(b"%stderr".to_vec(), StreamKind::Writer(stderr));
        reg
    }

    pub fn register(&mut self, name: Vec<u8>, kind: StreamKind) -> FileId {
        let id = self.next_id;
        self.next_id += 1;
        self.files.insert(
            id,
            FileStream {
                name,
                kind,
                ungot: None,
                line_num: 1,
                closed: false,
                position: 0,
            },
        );
        FileId(id)
    }

    /// Open a named file. The standard `%`-names resolve to the registered
    /// proxies; anything else hits the filesystem.
    pub fn open(&mut self, name: &[u8], write: bool) -> PsResult<FileId> {
        match name {
            b"%stdin" => return Ok(self.stdin_id),
            b"%stdout" => return Ok(self.stdout_id),
            b"%stderr" => return Ok(self.stderr_id),
            _ => {}
        }
        let path = String::from_utf8_lossy(name).into_owned();
        if write {
            let f = fs::File::create(&path).map_err(|_| ErrorKind::InvalidFileAccess)?;
            Ok(self.register(name.to_vec(), StreamKind::DiskWrite(f)))
        } else {
            let f = fs::File::open(&path).map_err(|_| ErrorKind::UndefinedFilename)?;
            Ok(self.register(name.to_vec(), StreamKind::Disk(BufReader::new(f))))
        }
    }

    pub fn get(&mut self, id: FileId) -> PsResult<&mut FileStream> {
        self.files
            .get_mut(&id.0)
            .ok_or_else(|| ErrorKind::IoError.into())
    }

    pub fn status(&self, id: FileId) -> bool {
        self.files.get(&id.0).map(|f| !f.closed).unwrap_or(false)
    }

    pub fn close(&mut self, id: FileId) {
        // The standard streams survive closefile (they are proxies).
        if id == self.stdin_id || id == self.stdout_id || id == self.stderr_id {
            return;
        }
        if let Some(f) = self.files.get_mut(&id.0) {
            f.close();
        }
    }

    pub fn write_stdout(&mut self, bytes: &[u8]) -> PsResult<()> {
        let id = self.stdout_id;
        self.get(id)?.write_all(bytes)
    }

    pub fn write_stderr(&mut self, bytes: &[u8]) -> PsResult<()> {
        let id = self.stderr_id;
        self.get(id)?.write_all(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pushback_round_trips() {
        let mut reg = FileRegistry::with_streams(
            Box::new(io::Cursor::new(b"ab".to_vec())),
            Box::new(Vec::new()),
            Box::new(Vec::new()),
        );
        let id = reg.stdin_id;
        let f = reg.get(id).unwrap();
        assert_eq!(f.read_byte().unwrap(), Some(b'a'));
        f.unread(b'a');
        assert_eq!(f.read_byte().unwrap(), Some(b'a'));
        assert_eq!(f.read_byte().unwrap(), Some(b'b'));
        assert_eq!(f.read_byte().unwrap(), None);
    }

    #[test]
    fn standard_streams_survive_close() {
        let mut reg = FileRegistry::with_standard_io();
        let id = reg.stdout_id;
        reg.close(id);
        assert!(reg.status(id));
    }

    #[test]
    fn missing_file_is_undefinedfilename() {
        let mut reg = FileRegistry::with_standard_io();
        let err = reg.open(b"/definitely/not/here.ps", false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::UndefinedFilename);
    }
}
