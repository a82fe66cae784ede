//! Blocking `MediaSource` fed by an async byte channel.
//!
//! The chunk feeder sends compressed bytes into a bounded
//! `tokio::sync::mpsc` channel; the decoder thread blocks in `read` until the
//! next chunk arrives. Dropping the sender is end of input.

use bytes::Bytes;
use std::collections::VecDeque;
use std::io::{self, Read, Seek, SeekFrom};
use symphonia::core::io::MediaSource;
use tokio::sync::mpsc;

pub struct ChannelMediaSource {
    primed: VecDeque<Bytes>,
    rx: mpsc::Receiver<Bytes>,
    current: Bytes,
    position: u64,
}

impl ChannelMediaSource {
    /// `primed` chunks are read before anything from `rx`.
    pub fn new(primed: Vec<Bytes>, rx: mpsc::Receiver<Bytes>) -> Self {
        Self {
            primed: primed.into(),
            rx,
            current: Bytes::new(),
            position: 0,
        }
    }

    /// Returns `false` once every sender is gone and all data was read.
    ///
    /// Must only be called off the async runtime (decoder thread).
    fn refill(&mut self) -> bool {
        while self.current.is_empty() {
            let next = match self.primed.pop_front() {
                Some(chunk) => Some(chunk),
                None => self.rx.blocking_recv(),
            };
            match next {
                Some(chunk) => self.current = chunk,
                None => return false,
            }
        }
        true
    }
}

impl Read for ChannelMediaSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || !self.refill() {
            return Ok(0);
        }

        let n = buf.len().min(self.current.len());
        buf[..n].copy_from_slice(&self.current.split_to(n));
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for ChannelMediaSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            // Symphonia uses this as "tell".
            SeekFrom::Current(0) => Ok(self.position),
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "streamed recording audio is not seekable",
            )),
        }
    }
}

impl MediaSource for ChannelMediaSource {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}
