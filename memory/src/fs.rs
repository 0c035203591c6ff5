//! Host filesystem interface.
//!
//! Snapshots and the file primitives reach the host through this trait.
//! Descriptor operations report failures numerically so the image can
//! surface errno-style codes; streams for snapshot I/O come back as
//! boxed readers/writers.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const BAD_FD: i32 = -1;

/// A seekable byte stream for snapshot I/O.
pub trait ImageStream: Read + Write + Seek {}

impl<T: Read + Write + Seek> ImageStream for T {}

pub trait FileSystem {
    /// Open the snapshot image itself. `write` truncates and creates.
    fn open_image(&mut self, name: &str, write: bool) -> io::Result<Box<dyn ImageStream>>;

    // Descriptor operations for the file primitives. All failures set
    // the numeric last error and answer `BAD_FD` / a negative count.

    fn open(&mut self, name: &str, writable: bool) -> i32;
    fn close(&mut self, fd: i32) -> i32;
    fn read(&mut self, fd: i32, buffer: &mut [u8]) -> i32;
    fn write(&mut self, fd: i32, buffer: &[u8]) -> i32;
    fn seek_to(&mut self, fd: i32, position: i32) -> i32;
    fn tell(&mut self, fd: i32) -> i32;
    fn file_size(&mut self, fd: i32) -> i32;
    fn truncate(&mut self, fd: i32, size: i32) -> i32;
    fn last_error(&self) -> i32;

    fn enumerate_directory(&mut self, name: &str) -> Vec<String>;
    fn delete_file(&mut self, name: &str) -> bool;
    fn rename_file(&mut self, old_name: &str, new_name: &str) -> bool;
}

/// std::fs-backed filesystem rooted at a directory.
pub struct HostFileSystem {
    root: PathBuf,
    files: Vec<Option<File>>,
    last_error: i32,
}

impl HostFileSystem {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            files: Vec::new(),
            last_error: 0,
        }
    }

    fn resolve(&self, name: &str) -> PathBuf {
        // images use absolute-looking names; everything stays under root
        let relative = name.trim_start_matches('/');
        self.root.join(relative)
    }

    fn record_error(&mut self, error: &io::Error) {
        self.last_error = error.raw_os_error().unwrap_or(-1);
    }

    fn file_mut(&mut self, fd: i32) -> Option<&mut File> {
        if fd < 0 {
            return None;
        }
        self.files.get_mut(fd as usize).and_then(Option::as_mut)
    }
}

impl FileSystem for HostFileSystem {
    fn open_image(&mut self, name: &str, write: bool) -> io::Result<Box<dyn ImageStream>> {
        let path = self.resolve(name);
        let file = if write {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)?
        } else {
            File::open(&path)?
        };
        Ok(Box::new(file))
    }

    fn open(&mut self, name: &str, writable: bool) -> i32 {
        let path = self.resolve(name);
        let result = if writable {
            OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&path)
        } else {
            File::open(&path)
        };
        match result {
            Ok(file) => {
                self.last_error = 0;
                if let Some(slot) =
                    self.files.iter().position(|entry| entry.is_none())
                {
                    self.files[slot] = Some(file);
                    slot as i32
                } else {
                    self.files.push(Some(file));
                    (self.files.len() - 1) as i32
                }
            }
            Err(error) => {
                self.record_error(&error);
                BAD_FD
            }
        }
    }

    fn close(&mut self, fd: i32) -> i32 {
        if fd >= 0 && (fd as usize) < self.files.len() {
            if self.files[fd as usize].take().is_some() {
                self.last_error = 0;
                return 0;
            }
        }
        self.last_error = libc_errno::EBADF;
        -1
    }

    fn read(&mut self, fd: i32, buffer: &mut [u8]) -> i32 {
        let Some(file) = self.file_mut(fd) else {
            self.last_error = libc_errno::EBADF;
            return -1;
        };
        match file.read(buffer) {
            Ok(count) => {
                self.last_error = 0;
                count as i32
            }
            Err(error) => {
                self.record_error(&error);
                -1
            }
        }
    }

    fn write(&mut self, fd: i32, buffer: &[u8]) -> i32 {
        let Some(file) = self.file_mut(fd) else {
            self.last_error = libc_errno::EBADF;
            return -1;
        };
        match file.write_all(buffer) {
            Ok(()) => {
                self.last_error = 0;
                buffer.len() as i32
            }
            Err(error) => {
                self.record_error(&error);
                -1
            }
        }
    }

    fn seek_to(&mut self, fd: i32, position: i32) -> i32 {
        let Some(file) = self.file_mut(fd) else {
            self.last_error = libc_errno::EBADF;
            return -1;
        };
        match file.seek(SeekFrom::Start(position.max(0) as u64)) {
            Ok(offset) => {
                self.last_error = 0;
                offset as i32
            }
            Err(error) => {
                self.record_error(&error);
                -1
            }
        }
    }

    fn tell(&mut self, fd: i32) -> i32 {
        let Some(file) = self.file_mut(fd) else {
            self.last_error = libc_errno::EBADF;
            return -1;
        };
        match file.stream_position() {
            Ok(offset) => {
                self.last_error = 0;
                offset as i32
            }
            Err(error) => {
                self.record_error(&error);
                -1
            }
        }
    }

    fn file_size(&mut self, fd: i32) -> i32 {
        let Some(file) = self.file_mut(fd) else {
            self.last_error = libc_errno::EBADF;
            return -1;
        };
        match file.metadata() {
            Ok(metadata) => {
                self.last_error = 0;
                metadata.len() as i32
            }
            Err(error) => {
                self.record_error(&error);
                -1
            }
        }
    }

    fn truncate(&mut self, fd: i32, size: i32) -> i32 {
        let Some(file) = self.file_mut(fd) else {
            self.last_error = libc_errno::EBADF;
            return -1;
        };
        match file.set_len(size.max(0) as u64) {
            Ok(()) => {
                self.last_error = 0;
                0
            }
            Err(error) => {
                self.record_error(&error);
                -1
            }
        }
    }

    fn last_error(&self) -> i32 {
        self.last_error
    }

    fn enumerate_directory(&mut self, name: &str) -> Vec<String> {
        let path = self.resolve(name);
        let mut names = Vec::new();
        match fs::read_dir(&path) {
            Ok(entries) => {
                self.last_error = 0;
                for entry in entries.flatten() {
                    if let Some(file_name) = entry.file_name().to_str() {
                        names.push(file_name.to_string());
                    }
                }
            }
            Err(error) => self.record_error(&error),
        }
        names
    }

    fn delete_file(&mut self, name: &str) -> bool {
        let path = self.resolve(name);
        let result = if Path::is_dir(&path) {
            fs::remove_dir(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => {
                self.last_error = 0;
                true
            }
            Err(error) => {
                self.record_error(&error);
                false
            }
        }
    }

    fn rename_file(&mut self, old_name: &str, new_name: &str) -> bool {
        let from = self.resolve(old_name);
        let to = self.resolve(new_name);
        match fs::rename(&from, &to) {
            Ok(()) => {
                self.last_error = 0;
                true
            }
            Err(error) => {
                self.record_error(&error);
                false
            }
        }
    }
}

/// The errno values the image knows about.
mod libc_errno {
    pub const EBADF: i32 = 9;
}
