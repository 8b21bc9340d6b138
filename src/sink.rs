//! Result sinks
//!
//! A sink receives every acquired file exactly once, as a name plus a
//! forward-only stream, and writes it out without buffering whole files.

use crate::error::{CollectorError, Result};
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Destination for acquired files
pub trait ResultSink {
    /// Stream one entry into the sink, returning the number of bytes written
    fn write_entry(&mut self, name: &str, reader: &mut dyn Read) -> Result<u64>;

    /// Flush and close the sink; no entries may follow
    fn finish(&mut self) -> Result<()>;
}

/// Writes every entry, uncompressed, into a zip archive
pub struct ZipSink<W: Write + Seek> {
    writer: Option<ZipWriter<W>>,
    finished: Option<W>,
    options: SimpleFileOptions,
}

impl ZipSink<File> {
    /// Create (or truncate) a zip file on disk
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::new(file))
    }
}

impl<W: Write + Seek> ZipSink<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: Some(ZipWriter::new(inner)),
            finished: None,
            // Entries can exceed 4 GiB (hives, $MFT on large volumes)
            options: SimpleFileOptions::default()
                .compression_method(CompressionMethod::Stored)
                .large_file(true),
        }
    }

    /// Underlying writer, available once the archive is finished
    pub fn into_inner(self) -> Option<W> {
        self.finished
    }
}

impl<W: Write + Seek> ResultSink for ZipSink<W> {
    fn write_entry(&mut self, name: &str, reader: &mut dyn Read) -> Result<u64> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            CollectorError::SinkError(name.to_string(), "archive already finished".to_string())
        })?;

        writer.start_file(name, self.options)?;
        match std::io::copy(reader, writer) {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                // Drop the partial entry so the archive stays consistent
                let _ = writer.abort_file();
                Err(CollectorError::SinkError(name.to_string(), e.to_string()))
            }
        }
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            self.finished = Some(writer.finish()?);
        }
        Ok(())
    }
}
