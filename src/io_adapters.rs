//! Stream adapters: the shell's inherited standard streams for live
//! stages, and memory-backed streams for exercising stages in tests.

use crate::command::{Stdin, Stdout};
use std::io::{self, Cursor, Read, Result as IoResult, Write};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

/// Stage stdin that falls through to the shell's own standard input.
pub struct InheritedStdin;

impl Read for InheritedStdin {
    fn read(&mut self, buf: &mut [u8]) -> IoResult<usize> {
        io::stdin().lock().read(buf)
    }
}

impl Stdin for InheritedStdin {
    fn stdio(self: Box<Self>) -> Stdio {
        Stdio::inherit()
    }
}

/// Stage stdout that falls through to the shell's own standard output.
pub struct InheritedStdout;

impl Write for InheritedStdout {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        io::stdout().lock().write(buf)
    }

    fn flush(&mut self) -> IoResult<()> {
        io::stdout().lock().flush()
    }
}

impl Stdout for InheritedStdout {
    fn stdio(self: Box<Self>) -> Stdio {
        Stdio::inherit()
    }
}

/// Stage stderr that falls through to the shell's own standard error.
pub struct InheritedStderr;

impl Write for InheritedStderr {
    fn write(&mut self, buf: &[u8]) -> IoResult<usize> {
        io::stderr().lock().write(buf)
    }

    fn flush(&mut self) -> IoResult<()> {
        io::stderr().lock().flush()
    }
}

impl Stdout for InheritedStderr {
    fn stdio(self: Box<Self>) -> Stdio {
        Stdio::inherit()
    }
}

/// Memory-backed reader for feeding a stage from a byte buffer.
pub struct MemReader {
    cursor: Cursor<Vec<u8>>,
}

impl MemReader {
    pub fn new(buf: Vec<u8>) -> Self {
        Self {
            cursor: Cursor::new(buf),
        }
    }
}

impl Read for MemReader {
    fn read(&mut self, out: &mut [u8]) -> IoResult<usize> {
        self.cursor.read(out)
    }
}

impl Stdin for MemReader {
    /// In-memory streams have no process-level counterpart; a child
    /// spawned against one reads from the null device.
    fn stdio(self: Box<Self>) -> Stdio {
        Stdio::null()
    }
}

/// Memory-backed writer capturing a stage's output.
///
/// The buffer is shared, so a handle obtained before the stage runs can
/// be read after the stage (and its thread) is done with the writer.
pub struct MemWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemWriter {
    pub fn new() -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a writer and a handle onto its backing buffer.
    pub fn with_handle() -> (Self, Arc<Mutex<Vec<u8>>>) {
        let writer = MemWriter::new();
        let handle = writer.buf.clone();
        (writer, handle)
    }
}

impl Default for MemWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for MemWriter {
    fn write(&mut self, data: &[u8]) -> IoResult<usize> {
        self.buf
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> IoResult<()> {
        Ok(())
    }
}

impl Stdout for MemWriter {
    fn stdio(self: Box<Self>) -> Stdio {
        Stdio::null()
    }
}

/// Collected contents of a [`MemWriter`] handle as UTF-8 text.
pub fn collected_string(handle: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8_lossy(&handle.lock().unwrap_or_else(PoisonError::into_inner)).into_owned()
}
