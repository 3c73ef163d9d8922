//! Byte transports for the emulated adapter
//!
//! The emulator only sees the [`Transport`] trait: a duplex byte stream that
//! can be polled without blocking. Two host implementations are provided:
//! [`StreamTransport`] for real streams (stdio, a serial device node) and
//! [`MemoryTransport`] for scripted sessions.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, info};

/// Fixed line rate of the emulated adapter
pub const DEFAULT_BAUD: u32 = 9600;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to open transport: {0}")]
    Open(#[source] io::Error),

    #[error("Failed to write to transport: {0}")]
    Write(#[source] io::Error),

    #[error("Transport is not open")]
    NotOpen,
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Result of a single read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadByte {
    Byte(u8),
    /// No byte could be produced
    EndOfStream,
}

/// Duplex byte stream the emulator talks over
pub trait Transport {
    /// Open the stream at the given line rate
    fn open(&mut self, baud: u32) -> Result<()>;

    /// True when at least one byte can be read without blocking
    fn available(&mut self) -> bool;

    /// Read one byte; never blocks
    fn read(&mut self) -> ReadByte;

    /// Write raw bytes
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    /// True once the far end has gone away and no buffered input remains
    fn is_closed(&self) -> bool;
}

/// Transport over any blocking reader/writer pair.
///
/// Reads happen on a dedicated thread that forwards chunks over a channel, so
/// `available()` and `read()` stay non-blocking for the tick loop.
pub struct StreamTransport {
    name: String,
    reader: Option<Box<dyn Read + Send>>,
    writer: Box<dyn Write + Send>,
    /// Running flag shared with the reader thread
    running: Arc<AtomicBool>,
    reader_thread: Option<JoinHandle<()>>,
    input_rx: Option<Receiver<Vec<u8>>>,
    pending: VecDeque<u8>,
    disconnected: bool,
}

impl StreamTransport {
    pub fn new(
        name: impl Into<String>,
        reader: Box<dyn Read + Send>,
        writer: Box<dyn Write + Send>,
    ) -> Self {
        Self {
            name: name.into(),
            reader: Some(reader),
            writer,
            running: Arc::new(AtomicBool::new(false)),
            reader_thread: None,
            input_rx: None,
            pending: VecDeque::new(),
            disconnected: false,
        }
    }

    /// Transport bound to the process's stdin/stdout
    pub fn stdio() -> Self {
        Self::new("stdio", Box::new(io::stdin()), Box::new(io::stdout()))
    }

    /// Transport bound to a device node or file opened read/write
    pub fn device(path: &str) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(TransportError::Open)?;
        let reader = file.try_clone().map_err(TransportError::Open)?;
        Ok(Self::new(path, Box::new(reader), Box::new(file)))
    }

    /// Move everything the reader thread has delivered into `pending`
    fn pump(&mut self) {
        let Some(rx) = &self.input_rx else {
            return;
        };
        loop {
            match rx.try_recv() {
                Ok(chunk) => self.pending.extend(chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    break;
                }
            }
        }
    }
}

impl Transport for StreamTransport {
    fn open(&mut self, baud: u32) -> Result<()> {
        let Some(mut reader) = self.reader.take() else {
            // Already open; the line rate cannot change on a host stream
            return Ok(());
        };

        info!("Opening transport {} at {} baud", self.name, baud);
        self.running.store(true, Ordering::SeqCst);

        let (tx, rx) = mpsc::channel::<Vec<u8>>();
        self.input_rx = Some(rx);

        let running = self.running.clone();
        let reader_thread = thread::spawn(move || {
            let mut buffer = vec![0u8; 256];
            loop {
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                match reader.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buffer[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
            running.store(false, Ordering::SeqCst);
        });

        self.reader_thread = Some(reader_thread);
        Ok(())
    }

    fn available(&mut self) -> bool {
        self.pump();
        !self.pending.is_empty()
    }

    fn read(&mut self) -> ReadByte {
        if self.pending.is_empty() {
            self.pump();
        }
        match self.pending.pop_front() {
            Some(b) => ReadByte::Byte(b),
            None => ReadByte::EndOfStream,
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if self.input_rx.is_none() {
            return Err(TransportError::NotOpen);
        }
        self.writer.write_all(bytes).map_err(TransportError::Write)?;
        self.writer.flush().map_err(TransportError::Write)
    }

    fn is_closed(&self) -> bool {
        self.disconnected && self.pending.is_empty()
    }
}

impl Drop for StreamTransport {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        // A reader blocked on stdin cannot be interrupted; only join once it
        // has finished on its own.
        if let Some(handle) = self.reader_thread.take() {
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                debug!("Leaving reader thread for {} detached", self.name);
            }
        }
    }
}

/// In-memory transport.
///
/// Input is queued up front; everything written is captured, before and after
/// [`MemoryTransport::close`]. Replies queued
/// with [`MemoryTransport::queue_reply`] are released into the input, one per
/// written carriage return, emulating a peer that answers each command.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    input: VecDeque<u8>,
    output: Vec<u8>,
    replies: VecDeque<Vec<u8>>,
    baud: Option<u32>,
    closed: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue bytes to be read
    pub fn push_input(&mut self, bytes: &[u8]) {
        self.input.extend(bytes.iter().copied());
    }

    /// Queue a reply released after the next terminated write
    pub fn queue_reply(&mut self, bytes: &[u8]) {
        self.replies.push_back(bytes.to_vec());
    }

    /// Everything written so far
    pub fn output(&self) -> &[u8] {
        &self.output
    }

    /// Bytes still waiting to be read
    #[cfg(test)]
    pub fn pending_input(&self) -> usize {
        self.input.len()
    }

    /// Line rate the transport was opened at
    #[cfg(test)]
    pub fn baud(&self) -> Option<u32> {
        self.baud
    }

    /// Signal end of input; the transport reports closed once the queued
    /// input has been read. Writes are still captured.
    pub fn close(&mut self) {
        self.closed = true;
    }
}

impl Transport for MemoryTransport {
    fn open(&mut self, baud: u32) -> Result<()> {
        self.baud = Some(baud);
        Ok(())
    }

    fn available(&mut self) -> bool {
        !self.input.is_empty()
    }

    fn read(&mut self) -> ReadByte {
        match self.input.pop_front() {
            Some(b) => ReadByte::Byte(b),
            None => ReadByte::EndOfStream,
        }
    }

    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if self.baud.is_none() {
            return Err(TransportError::NotOpen);
        }
        self.output.extend_from_slice(bytes);
        for _ in bytes.iter().filter(|&&b| b == b'\r') {
            if let Some(reply) = self.replies.pop_front() {
                self.input.extend(reply);
            }
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed && self.input.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::time::{Duration, Instant};

    #[test]
    fn test_memory_transport_requires_open() {
        let mut transport = MemoryTransport::new();
        assert!(matches!(transport.write(b"x"), Err(TransportError::NotOpen)));

        transport.open(DEFAULT_BAUD).unwrap();
        assert_eq!(transport.baud(), Some(9600));
        transport.write(b"x").unwrap();
        assert_eq!(transport.output(), b"x");
    }

    #[test]
    fn test_memory_transport_releases_reply_per_terminator() {
        let mut transport = MemoryTransport::new();
        transport.open(DEFAULT_BAUD).unwrap();
        transport.queue_reply(b"OK\r");
        transport.queue_reply(b"ELM327 v1.5\r");

        transport.write(b"ATZ").unwrap();
        assert!(!transport.available());

        transport.write(b"\r").unwrap();
        assert_eq!(transport.pending_input(), 3);

        let mut read = Vec::new();
        while let ReadByte::Byte(b) = transport.read() {
            read.push(b);
        }
        assert_eq!(read, b"OK\r");
        assert_eq!(transport.read(), ReadByte::EndOfStream);
    }

    #[test]
    fn test_memory_transport_closed_after_drain() {
        let mut transport = MemoryTransport::new();
        transport.push_input(b"A");
        transport.close();
        assert!(!transport.is_closed());
        transport.read();
        assert!(transport.is_closed());

        transport.open(DEFAULT_BAUD).unwrap();
        transport.write(b"ATZ\r").unwrap();
        assert_eq!(transport.output(), b"ATZ\r");
    }

    #[test]
    fn test_stream_transport_reads_all_input() {
        let mut transport = StreamTransport::new(
            "cursor",
            Box::new(Cursor::new(b"ATZ\r".to_vec())),
            Box::new(Vec::<u8>::new()),
        );
        transport.open(DEFAULT_BAUD).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut read = Vec::new();
        while !transport.is_closed() && Instant::now() < deadline {
            if transport.available() {
                if let ReadByte::Byte(b) = transport.read() {
                    read.push(b);
                }
            } else {
                thread::sleep(Duration::from_millis(1));
            }
        }

        assert_eq!(read, b"ATZ\r");
        assert!(transport.is_closed());
    }

    #[test]
    fn test_stream_transport_write_before_open() {
        let mut transport = StreamTransport::new(
            "cursor",
            Box::new(Cursor::new(Vec::<u8>::new())),
            Box::new(Vec::<u8>::new()),
        );
        assert!(matches!(transport.write(b"AT"), Err(TransportError::NotOpen)));
    }
}
