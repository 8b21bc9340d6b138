//! Extent reader
//!
//! Presents a run list as one forward-only byte stream. Runs are read in
//! order; the device is sought explicitly before every chunk, so several
//! extent readers can share one device as long as they are not read
//! concurrently. Sparse runs produce zeros without touching the device.

use crate::error::CollectorError;
use crate::ntfs::DataRun;
use crate::volume::{SharedDevice, VolumeHandle};
use std::io::{Read, Seek, SeekFrom};

/// Lazy sequential reader over a run list
pub struct ExtentReader<D> {
    device: SharedDevice<D>,
    cluster_size: u64,
    runs: Vec<DataRun>,
    /// Index of the run being read
    run_index: usize,
    /// Bytes of the current run already pulled into the buffer
    run_position: u64,
    /// Bytes still to hand out before the stream ends
    remaining: u64,
    /// Bytes to drop from the next chunk (unaligned start offset)
    discard: u64,
    chunk_size: usize,
    buffer: Vec<u8>,
    buffer_pos: usize,
    buffer_len: usize,
    failed: bool,
}

impl<D: Read + Seek> ExtentReader<D> {
    /// Reader over every byte the runs cover
    pub fn new(volume: &VolumeHandle<D>, runs: Vec<DataRun>, chunk_size: usize) -> Self {
        Self::from_device(volume.device(), volume.cluster_size(), runs, chunk_size)
    }

    pub fn from_device(
        device: SharedDevice<D>,
        cluster_size: u64,
        runs: Vec<DataRun>,
        chunk_size: usize,
    ) -> Self {
        let cluster_size = cluster_size.max(1);
        let total = runs
            .iter()
            .map(|run| run.cluster_count.saturating_mul(cluster_size))
            .fold(0u64, u64::saturating_add);
        // Raw volume handles only accept whole-sector reads
        let chunk_size = (chunk_size as u64).max(cluster_size) / cluster_size * cluster_size;

        Self {
            device,
            cluster_size,
            runs,
            run_index: 0,
            run_position: 0,
            remaining: total,
            discard: 0,
            chunk_size: chunk_size as usize,
            buffer: Vec::new(),
            buffer_pos: 0,
            buffer_len: 0,
            failed: false,
        }
    }

    /// Skip the first `offset` bytes of the stream
    pub fn with_start_offset(mut self, offset: u64) -> Self {
        let mut skip = offset.min(self.remaining);
        self.remaining -= skip;

        while let Some(run) = self.runs.get(self.run_index) {
            let run_bytes = run.cluster_count.saturating_mul(self.cluster_size);
            if skip < run_bytes {
                // Start reading at the enclosing cluster, drop the rest
                let aligned = skip / self.cluster_size * self.cluster_size;
                self.run_position = aligned;
                self.discard = skip - aligned;
                break;
            }
            skip -= run_bytes;
            self.run_index += 1;
        }
        self
    }

    /// Make the stream exactly `limit` bytes long.
    ///
    /// Cluster slack past the limit is dropped. A run list that ends before
    /// the limit fails the stream once the runs are used up.
    pub fn with_length_limit(mut self, limit: u64) -> Self {
        self.remaining = limit;
        self
    }

    /// Bytes this reader has yet to produce
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Pull the next chunk of the current run into the buffer
    fn fill_buffer(&mut self) -> std::io::Result<()> {
        loop {
            let run = match self.runs.get(self.run_index) {
                Some(run) => *run,
                None => {
                    self.buffer_len = 0;
                    return Ok(());
                }
            };

            let run_bytes = run.cluster_count.saturating_mul(self.cluster_size);
            if self.run_position >= run_bytes {
                self.run_index += 1;
                self.run_position = 0;
                continue;
            }

            let want = (run_bytes - self.run_position).min(self.chunk_size as u64) as usize;
            if self.buffer.len() < want {
                self.buffer.resize(want, 0);
            }

            match run.lcn {
                None => self.buffer[..want].fill(0),
                Some(lcn) => {
                    let offset = lcn
                        .saturating_mul(self.cluster_size)
                        .saturating_add(self.run_position);
                    self.read_device(offset, want)?;
                }
            }

            self.run_position += want as u64;
            self.buffer_pos = 0;
            self.buffer_len = want;

            if self.discard > 0 {
                let dropped = (self.discard as usize).min(want);
                self.buffer_pos = dropped;
                self.discard -= dropped as u64;
            }
            return Ok(());
        }
    }

    fn read_device(&mut self, offset: u64, want: usize) -> std::io::Result<()> {
        let run_index = self.run_index;
        let tag = |source: std::io::Error| {
            CollectorError::ExtentReadError {
                run_index,
                offset,
                source,
            }
            .into_io()
        };

        let mut device = self.device.lock();
        device.seek(SeekFrom::Start(offset)).map_err(tag)?;

        let mut filled = 0;
        while filled < want {
            match device.read(&mut self.buffer[filled..want]) {
                Ok(0) => {
                    return Err(tag(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        format!("device ended after {} of {} bytes", filled, want),
                    )))
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(tag(e)),
            }
        }
        Ok(())
    }
}

impl<D: Read + Seek> Read for ExtentReader<D> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.failed {
            return Err(std::io::Error::other("extent stream already failed"));
        }

        while self.remaining > 0 && !buf.is_empty() {
            if self.buffer_pos >= self.buffer_len {
                if let Err(e) = self.fill_buffer() {
                    self.failed = true;
                    return Err(e);
                }
                if self.buffer_len == 0 {
                    self.failed = true;
                    return Err(CollectorError::RunListTooShort {
                        run_count: self.runs.len(),
                        missing: self.remaining,
                    }
                    .into_io());
                }
                continue;
            }

            let available = (self.buffer_len - self.buffer_pos) as u64;
            let count = available.min(self.remaining).min(buf.len() as u64) as usize;
            buf[..count].copy_from_slice(&self.buffer[self.buffer_pos..self.buffer_pos + count]);
            self.buffer_pos += count;
            self.remaining -= count as u64;
            return Ok(count);
        }

        Ok(0)
    }
}
