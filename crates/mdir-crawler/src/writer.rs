//! Incremental JSON array output, one file per member type.
//!
//! Every page is appended to the array as soon as it is sorted, the file is
//! never read back nor rewritten. Once the first page is written the file is
//! a valid prefix of a JSON array, the closing `]` is added with the last page.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs_err as fs;
use serde::Serialize;

use crate::error::CrawlError;
use crate::record::MemberRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArrayState {
    /// `[` written, no element yet
    Opened,
    /// At least one element written, the next one needs a separator
    Filled,
    Closed,
}

#[derive(Debug)]
pub struct JsonArrayWriter {
    path: PathBuf,
    file: fs::File,
    state: ArrayState,
}

impl JsonArrayWriter {
    /// Creates or truncates `path` and opens the array
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, CrawlError> {
        let path = path.into();
        let file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| CrawlError::Write {
                path: path.clone(),
                source,
            })?;

        let mut wtr = Self {
            path,
            file,
            state: ArrayState::Opened,
        };
        wtr.write_bytes(b"[")?;
        Ok(wtr)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.state == ArrayState::Closed
    }

    /// Appends `items` to the array body, then closes it unless `keep_open`
    pub fn append<T: Serialize>(&mut self, items: &[T], keep_open: bool) -> Result<(), CrawlError> {
        if self.is_closed() {
            return Err(CrawlError::ArrayClosed {
                path: self.path.clone(),
            });
        }

        let mut buf = Vec::new();
        for item in items {
            if self.state == ArrayState::Filled || !buf.is_empty() {
                buf.push(b',');
            }
            serde_json::to_writer(&mut buf, item).map_err(|e| CrawlError::Write {
                path: self.path.clone(),
                source: io::Error::from(e),
            })?;
        }
        if !items.is_empty() {
            self.state = ArrayState::Filled;
        }
        if !keep_open {
            buf.push(b']');
        }

        self.write_bytes(&buf)?;
        if !keep_open {
            self.state = ArrayState::Closed;
        }
        Ok(())
    }

    pub fn close(&mut self) -> Result<(), CrawlError> {
        if self.is_closed() {
            return Ok(());
        }
        self.write_bytes(b"]")?;
        self.state = ArrayState::Closed;
        Ok(())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), CrawlError> {
        self.file
            .write_all(bytes)
            .and_then(|_| self.file.flush())
            .map_err(|source| CrawlError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

/// Routes sorted pages to the array file of their member type
#[derive(Debug)]
pub struct StreamingWriter {
    data_dir: PathBuf,
    files: HashMap<String, JsonArrayWriter>,
}

impl StreamingWriter {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, CrawlError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir).map_err(|source| CrawlError::Write {
            path: data_dir.clone(),
            source,
        })?;
        Ok(Self {
            data_dir,
            files: HashMap::new(),
        })
    }

    pub fn output_path(&self, member_type: &str) -> PathBuf {
        output_path(&self.data_dir, member_type)
    }

    /// Appends one page of `member_type`.
    ///
    /// The first page of a type in the run truncates its file, pages of later
    /// targets of the same type continue the same array. `keep_open` must be
    /// false only for the last page of the last target of that type.
    pub fn append_page(
        &mut self,
        member_type: &str,
        records: &[MemberRecord],
        is_first_page_of_target: bool,
        keep_open: bool,
    ) -> Result<(), CrawlError> {
        let wtr = match self.files.entry(member_type.to_string()) {
            Entry::Vacant(entry) => {
                let path = output_path(&self.data_dir, member_type);
                log::info!("Creating {}", path.display());
                entry.insert(JsonArrayWriter::create(path)?)
            }
            Entry::Occupied(entry) => {
                if is_first_page_of_target {
                    log::debug!("Continuing {member_type} with a new target");
                }
                entry.into_mut()
            }
        };
        log::info!(
            "Appending {} members to {}",
            records.len(),
            wtr.path().display()
        );
        wtr.append(records, keep_open)
    }

    /// Closes every array still open, returns the written files
    pub fn finish(mut self) -> Result<Vec<PathBuf>, CrawlError> {
        let mut paths = Vec::with_capacity(self.files.len());
        for (member_type, wtr) in self.files.iter_mut() {
            if !wtr.is_closed() {
                log::warn!("Closing unfinished array of {member_type}");
                wtr.close()?;
            }
            paths.push(wtr.path().to_path_buf());
        }
        paths.sort();
        Ok(paths)
    }
}

pub fn output_path(data_dir: &Path, member_type: &str) -> PathBuf {
    data_dir.join(format!("{member_type}_members.json"))
}
