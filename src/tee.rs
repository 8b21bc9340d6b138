//! Single-pass stream duplication
//!
//! [`tee`] splits one reader into a primary side, read inline by whoever
//! owns it, and a branch that another thread drains at its own pace. Every
//! byte the primary side pulls from the source is forked into a bounded
//! channel, so the source is read exactly once no matter how many logical
//! consumers exist. When the branch falls behind by more than the channel
//! depth, the primary side waits.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::io::Read;

type Chunk = std::result::Result<Vec<u8>, String>;

/// Primary side of a tee
pub struct TeeReader<R> {
    inner: R,
    sender: Option<Sender<Chunk>>,
    forked: u64,
    detached: bool,
}

/// Branch side of a tee, fed by the primary side
pub struct TeeBranch {
    receiver: Receiver<Chunk>,
    current: Vec<u8>,
    pos: usize,
    finished: bool,
}

/// Split `inner` into a primary reader and a branch; `depth` bounds the
/// number of chunks the branch may lag behind.
pub fn tee<R: Read>(inner: R, depth: usize) -> (TeeReader<R>, TeeBranch) {
    let (sender, receiver) = bounded(depth.max(1));
    (
        TeeReader {
            inner,
            sender: Some(sender),
            forked: 0,
            detached: false,
        },
        TeeBranch {
            receiver,
            current: Vec::new(),
            pos: 0,
            finished: false,
        },
    )
}

impl<R: Read> TeeReader<R> {
    /// Bytes handed to the branch so far
    pub fn forked(&self) -> u64 {
        self.forked
    }

    /// True once the branch was dropped and forking stopped
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    fn fork(&mut self, bytes: &[u8]) {
        if let Some(sender) = &self.sender {
            if sender.send(Ok(bytes.to_vec())).is_ok() {
                self.forked += bytes.len() as u64;
            } else {
                // Nobody is listening any more; keep serving the primary side
                self.sender = None;
                self.detached = true;
            }
        }
    }

    /// Pull whatever the primary consumer left unread through the tee, then
    /// close the branch. Returns the number of bytes drained.
    pub fn finish(mut self) -> std::io::Result<u64> {
        let mut scratch = vec![0u8; 64 * 1024];
        let mut drained = 0u64;
        loop {
            match self.read(&mut scratch) {
                Ok(0) => break,
                Ok(n) => drained += n as u64,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        // Dropping the sender is the end-of-stream signal for the branch
        self.sender = None;
        Ok(drained)
    }
}

impl<R: Read> Read for TeeReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.inner.read(buf) {
            Ok(n) => {
                if n > 0 {
                    self.fork(&buf[..n]);
                }
                Ok(n)
            }
            Err(e) => {
                if e.kind() != std::io::ErrorKind::Interrupted {
                    if let Some(sender) = self.sender.take() {
                        let _ = sender.send(Err(e.to_string()));
                    }
                }
                Err(e)
            }
        }
    }
}

impl<R> Drop for TeeReader<R> {
    fn drop(&mut self) {
        // Still open here means finish() was never reached
        if let Some(sender) = self.sender.take() {
            let _ = sender.send(Err("source was abandoned before it was fully read".to_string()));
        }
    }
}

impl Read for TeeBranch {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.current.len() {
            if self.finished {
                return Ok(0);
            }
            match self.receiver.recv() {
                Ok(Ok(chunk)) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                Ok(Err(message)) => {
                    self.finished = true;
                    return Err(std::io::Error::other(message));
                }
                Err(_) => {
                    self.finished = true;
                    return Ok(0);
                }
            }
        }

        let count = (self.current.len() - self.pos).min(buf.len());
        buf[..count].copy_from_slice(&self.current[self.pos..self.pos + count]);
        self.pos += count;
        Ok(count)
    }
}
