use std::collections::HashMap;
use std::io::{Read, Seek, Write};

use anyhow::Context;
use parking_lot::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileMode {
    Read,
    Write,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FileHandle(u64);

/// Narrow file interface assets and shader manifests are read through, so
/// hosts can mount archives or in-memory trees.
pub trait FileSystem: Send + Sync {
    fn open_file(&self, path: &str, mode: FileMode) -> anyhow::Result<FileHandle>;
    fn file_size(&self, handle: FileHandle) -> anyhow::Result<u64>;
    fn read_file(&self, handle: FileHandle, buffer: &mut [u8]) -> anyhow::Result<usize>;
    fn write_file(&self, handle: FileHandle, data: &[u8]) -> anyhow::Result<()>;
    fn close_file(&self, handle: FileHandle);

    /// Whole-file convenience read.
    fn read_to_vec(&self, path: &str) -> anyhow::Result<Vec<u8>> {
        let handle = self.open_file(path, FileMode::Read)?;
        let size = self.file_size(handle)? as usize;
        let mut buffer = vec![0u8; size];
        let read = self.read_file(handle, &mut buffer)?;
        buffer.truncate(read);
        self.close_file(handle);
        Ok(buffer)
    }
}

/// [`FileSystem`] over the host OS filesystem.
#[derive(Default)]
pub struct StdFileSystem {
    open: Mutex<OpenFiles>,
}

#[derive(Default)]
struct OpenFiles {
    files: HashMap<u64, std::fs::File>,
    next_id: u64,
}

impl StdFileSystem {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FileSystem for StdFileSystem {
    fn open_file(&self, path: &str, mode: FileMode) -> anyhow::Result<FileHandle> {
        let file = match mode {
            FileMode::Read => std::fs::File::open(path),
            FileMode::Write => std::fs::File::create(path),
        }
        .with_context(|| format!("failed to open '{path}'"))?;
        let mut open = self.open.lock();
        let id = open.next_id;
        open.next_id += 1;
        open.files.insert(id, file);
        Ok(FileHandle(id))
    }

    fn file_size(&self, handle: FileHandle) -> anyhow::Result<u64> {
        let open = self.open.lock();
        let file = open.files.get(&handle.0).context("stale file handle")?;
        Ok(file.metadata()?.len())
    }

    fn read_file(&self, handle: FileHandle, buffer: &mut [u8]) -> anyhow::Result<usize> {
        let mut open = self.open.lock();
        let file = open.files.get_mut(&handle.0).context("stale file handle")?;
        file.rewind()?;
        let mut read = 0;
        while read < buffer.len() {
            let n = file.read(&mut buffer[read..])?;
            if n == 0 {
                break;
            }
            read += n;
        }
        Ok(read)
    }

    fn write_file(&self, handle: FileHandle, data: &[u8]) -> anyhow::Result<()> {
        let mut open = self.open.lock();
        let file = open.files.get_mut(&handle.0).context("stale file handle")?;
        file.write_all(data)?;
        Ok(())
    }

    fn close_file(&self, handle: FileHandle) {
        self.open.lock().files.remove(&handle.0);
    }
}
