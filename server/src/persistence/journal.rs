//! Append-only record log on local disk.
//!
//! Each entry is a little-endian `u32` length followed by the bincode
//! encoding of a [`Record`].

use super::{Record, Store, StoreError};
use bincode::{deserialize, serialize};
use log::info;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::Path;

pub struct JournalStore {
    writer: BufWriter<File>,
}

impl JournalStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        info!("Journaling game records to {}", path.display());
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    /// Reads every complete entry. A torn trailing entry is ignored.
    pub fn read_all(path: &Path) -> Result<Vec<Record>, StoreError> {
        let mut file = File::open(path)?;
        let mut records = Vec::new();
        let mut len_buf = [0u8; 4];

        loop {
            match file.read_exact(&mut len_buf) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let len = u32::from_le_bytes(len_buf) as usize;
            let mut data = vec![0u8; len];
            match file.read_exact(&mut data) {
                Ok(()) => records.push(deserialize(&data)?),
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(records)
    }
}

impl Store for JournalStore {
    fn apply(&mut self, record: &Record) -> Result<(), StoreError> {
        let data = serialize(record)?;
        let len = u32::try_from(data.len())
            .map_err(|_| StoreError::Unavailable("record too large".to_string()))?;

        self.writer.write_all(&len.to_le_bytes())?;
        self.writer.write_all(&data)?;
        self.writer.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        self.writer.flush()?;
        Ok(())
    }
}
