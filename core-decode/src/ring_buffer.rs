//! # Byte Ring Buffers
//!
//! Circular byte buffers shared between the decode core and its neighbouring
//! stages: the stream reader fills the input buffer, the renderer drains the
//! output buffer.
//!
//! ## Design
//!
//! - **One mutex per buffer**: cursors, contents and the stage-owned extension
//!   record (`E`) are all guarded by the same `parking_lot::Mutex`.
//! - **Never full**: [`BufferState::space`] reports `capacity - used - 1`, so the
//!   write cursor can never catch up with the read cursor and a full buffer is
//!   never confused with an empty one.
//! - **Contiguous spans**: [`BufferState::cont_read`] and
//!   [`BufferState::cont_write`] report how many bytes can be touched without
//!   crossing the wrap boundary. `cont_write` does not account for the reserved
//!   byte, callers must also bound writes by `space()`.
//!
//! ## Usage
//!
//! ```rust
//! use core_decode::ring_buffer::{InputBuffer, StreamState};
//!
//! let input = InputBuffer::new(4096);
//! {
//!     let mut stream = input.lock();
//!     stream.ext.state = StreamState::StreamingHttp;
//!     stream.write(&[0x01, 0x02, 0x03, 0x04]);
//! }
//! assert_eq!(input.lock().used(), 4);
//! ```

use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// Shared handle to a byte ring buffer.
///
/// Cloning the handle shares the underlying storage.
pub struct RingBuffer<E> {
    inner: Arc<Mutex<BufferState<E>>>,
}

impl<E> Clone for RingBuffer<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Default> RingBuffer<E> {
    /// Create a buffer with `capacity` bytes of backing storage.
    ///
    /// One byte is always kept free, so at most `capacity - 1` bytes can be
    /// buffered at once.
    pub fn new(capacity: usize) -> Self {
        Self::with_ext(capacity, E::default())
    }
}

impl<E> RingBuffer<E> {
    /// Create a buffer with an explicit extension record.
    pub fn with_ext(capacity: usize, ext: E) -> Self {
        let capacity = capacity.max(2);
        Self {
            inner: Arc::new(Mutex::new(BufferState {
                buf: vec![0; capacity].into_boxed_slice(),
                readp: 0,
                writep: 0,
                ext,
            })),
        }
    }

    /// Acquire the buffer's mutex.
    pub fn lock(&self) -> MutexGuard<'_, BufferState<E>> {
        self.inner.lock()
    }

    /// Acquire the buffer's mutex if no other thread holds it.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, BufferState<E>>> {
        self.inner.try_lock()
    }
}

/// Buffer contents, cursors and extension record, as seen under the mutex.
pub struct BufferState<E> {
    buf: Box<[u8]>,
    readp: usize,
    writep: usize,
    /// Stage-owned fields guarded by this buffer's mutex.
    pub ext: E,
}

impl<E> BufferState<E> {
    /// Size of the backing storage in bytes.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of bytes available to read.
    pub fn used(&self) -> usize {
        if self.writep >= self.readp {
            self.writep - self.readp
        } else {
            self.capacity() - self.readp + self.writep
        }
    }

    /// Number of bytes that can be written without the write cursor reaching
    /// the read cursor.
    pub fn space(&self) -> usize {
        self.capacity() - self.used() - 1
    }

    /// Longest readable run starting at the read cursor.
    pub fn cont_read(&self) -> usize {
        if self.writep >= self.readp {
            self.writep - self.readp
        } else {
            self.capacity() - self.readp
        }
    }

    /// Longest writable run starting at the write cursor, ignoring the
    /// reserved byte.
    pub fn cont_write(&self) -> usize {
        if self.writep >= self.readp {
            self.capacity() - self.writep
        } else {
            self.readp - self.writep
        }
    }

    /// Offset of the read cursor in the backing storage.
    pub fn readp(&self) -> usize {
        self.readp
    }

    /// Offset of the write cursor in the backing storage.
    pub fn writep(&self) -> usize {
        self.writep
    }

    /// Readable bytes up to the wrap boundary.
    pub fn read_slice(&self) -> &[u8] {
        let start = self.readp;
        &self.buf[start..start + self.cont_read()]
    }

    /// Writable bytes up to the wrap boundary.
    pub fn write_slice(&mut self) -> &mut [u8] {
        let start = self.writep;
        let len = self.cont_write();
        &mut self.buf[start..start + len]
    }

    /// Advance the read cursor by `by` bytes, wrapping at capacity.
    pub fn inc_readp(&mut self, by: usize) {
        debug_assert!(by <= self.used(), "read cursor advanced past written data");
        self.readp = (self.readp + by) % self.capacity();
    }

    /// Advance the write cursor by `by` bytes, wrapping at capacity.
    pub fn inc_writep(&mut self, by: usize) {
        debug_assert!(by <= self.space(), "write cursor advanced past free space");
        self.writep = (self.writep + by) % self.capacity();
    }

    /// Copy as much of `data` as fits into the buffer, wrapping as needed.
    ///
    /// Returns the number of bytes written.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let mut written = 0;
        while written < data.len() {
            let chunk = self
                .cont_write()
                .min(self.space())
                .min(data.len() - written);
            if chunk == 0 {
                break;
            }
            let start = self.writep;
            self.buf[start..start + chunk].copy_from_slice(&data[written..written + chunk]);
            self.inc_writep(chunk);
            written += chunk;
        }
        written
    }

    /// Copy up to `output.len()` buffered bytes into `output`, wrapping as
    /// needed.
    ///
    /// Returns the number of bytes read.
    pub fn read(&mut self, output: &mut [u8]) -> usize {
        let mut read = 0;
        while read < output.len() {
            let chunk = self.cont_read().min(output.len() - read);
            if chunk == 0 {
                break;
            }
            let start = self.readp;
            output[read..read + chunk].copy_from_slice(&self.buf[start..start + chunk]);
            self.inc_readp(chunk);
            read += chunk;
        }
        read
    }

    /// Discard all buffered bytes and rewind both cursors.
    pub fn clear(&mut self) {
        self.readp = 0;
        self.writep = 0;
    }

    /// Place both cursors at `offset` with nothing buffered.
    ///
    /// Lets producers and tests line up data against the wrap boundary.
    pub fn reset_to(&mut self, offset: usize) {
        let offset = offset % self.capacity();
        self.readp = offset;
        self.writep = offset;
    }
}

// ============================================================================
// Stage-Owned Extension Records
// ============================================================================

/// State of the upstream stream reader, ordered so that everything up to
/// `Disconnect` means no more input will arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StreamState {
    Stopped,
    Disconnect,
    StreamingWait,
    StreamingBuffering,
    StreamingFile,
    StreamingHttp,
    SendHeaders,
    RecvHeaders,
}

impl StreamState {
    /// Returns `true` once the reader has stopped feeding the input buffer.
    pub fn is_end_of_input(&self) -> bool {
        *self <= Self::Disconnect
    }
}

impl Default for StreamState {
    fn default() -> Self {
        Self::Stopped
    }
}

/// Fields owned by the stream reader, guarded by the input buffer's mutex.
#[derive(Debug, Clone, Default)]
pub struct StreamStatus {
    /// Current reader state.
    pub state: StreamState,
    /// Total bytes received for the current stream.
    pub bytes: u64,
}

/// Fade behaviour configured on the output stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FadeMode {
    #[default]
    None,
    Crossfade,
    In,
    Out,
    InOut,
}

impl FadeMode {
    /// Returns `true` if any fade is configured.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Fields owned by the renderer, guarded by the output buffer's mutex.
#[derive(Debug, Clone, Default)]
pub struct OutputStatus {
    /// Configured fade behaviour.
    pub fade_mode: FadeMode,
    /// Output write offset at which the current track starts.
    pub track_start: Option<usize>,
}

/// Buffer filled by the stream reader and drained by the decode core.
pub type InputBuffer = RingBuffer<StreamStatus>;
/// Buffer filled by the decode core and drained by the renderer.
pub type OutputBuffer = RingBuffer<OutputStatus>;
/// Locked view of the input buffer.
pub type InputState = BufferState<StreamStatus>;
/// Locked view of the output buffer.
pub type OutputState = BufferState<OutputStatus>;
