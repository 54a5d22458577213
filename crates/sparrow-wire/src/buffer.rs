use crate::error::BufferError;

pub const BUF_MIN_SIZE: usize = 4 * 1024;
pub const BUF_DEFAULT_SIZE: usize = 16 * 1024;
pub const BUF_MAX_SIZE: usize = 16 * 1024 * 1024;

/// Growable byte buffer backing a connection's receive or send side.
///
/// Bytes always live in one contiguous run `[read_index, read_index + size)`;
/// there is no wraparound. Writers compact to offset zero before growing so
/// the live run never has to be split.
#[derive(Debug)]
pub struct Buffer {
    data: Vec<u8>,
    capacity: usize,
    size: usize,
    read_index: usize,
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Buffer {
    pub fn new() -> Self {
        Self::with_capacity(BUF_DEFAULT_SIZE)
    }

    pub fn with_capacity(requested: usize) -> Self {
        let capacity = if (BUF_MIN_SIZE..=BUF_MAX_SIZE).contains(&requested) {
            requested
        } else {
            BUF_DEFAULT_SIZE
        };
        Self {
            data: vec![0u8; capacity],
            capacity,
            size: 0,
            read_index: 0,
        }
    }

    pub const fn len(&self) -> usize {
        self.size
    }

    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    fn compact(&mut self) {
        if self.read_index != 0 {
            self.data.copy_within(self.read_index..self.read_index + self.size, 0);
            self.read_index = 0;
        }
    }

    fn grow_to(&mut self, new_capacity: usize) {
        let mut grown = vec![0u8; new_capacity];
        grown[..self.size].copy_from_slice(&self.data[..self.size]);
        self.data = grown;
        self.capacity = new_capacity;
    }

    /// Ensures at least `n` free bytes past the current write position,
    /// compacting and doubling capacity as needed, and returns a writable
    /// slice of exactly `n` bytes. Unlike `write_in`, `size` is NOT advanced
    /// automatically — the caller commits however many bytes it actually
    /// filled via [`Buffer::commit`]. This is what lets a socket read land
    /// directly in the buffer without a double copy, even when the kernel
    /// hands back fewer bytes than were reserved.
    pub fn append_at(&mut self, n: usize) -> Result<&mut [u8], BufferError> {
        self.compact();
        while self.capacity - self.size < n {
            if self.capacity >= BUF_MAX_SIZE {
                return Err(BufferError::CapacityExceeded);
            }
            let doubled = self.capacity.saturating_mul(2).min(BUF_MAX_SIZE);
            self.grow_to(doubled);
        }
        let start = self.size;
        Ok(&mut self.data[start..start + n])
    }

    /// Marks `n` bytes, previously reserved via `append_at`, as live.
    pub fn commit(&mut self, n: usize) {
        debug_assert!(self.size + n <= self.capacity);
        self.size += n;
    }

    pub fn write_in(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        let dst = self.append_at(bytes.len())?;
        dst.copy_from_slice(bytes);
        self.commit(bytes.len());
        Ok(())
    }

    /// Returns the live bytes, compacting to offset zero first if the read
    /// index has drifted off a four-byte alignment (an inherited quirk from
    /// the amortized-compaction scheme this buffer mimics; harmless to skip
    /// but kept so the allocation behaves the way callers of the original
    /// were tuned against).
    pub fn read_ptr(&mut self) -> &[u8] {
        if self.read_index & 3 != 0 {
            self.data.copy_within(self.read_index..self.read_index + self.size, 0);
            self.read_index = 0;
        }
        &self.data[self.read_index..self.read_index + self.size]
    }

    /// Non-destructive look at up to `len` live bytes from the read cursor.
    pub fn peek(&self, len: usize) -> Option<&[u8]> {
        if self.size < len {
            return None;
        }
        Some(&self.data[self.read_index..self.read_index + len])
    }

    pub fn read_out(&mut self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.size);
        let src = self.read_ptr();
        dst[..n].copy_from_slice(&src[..n]);
        self.consume(n);
        n
    }

    /// Advances the read cursor by `len` (clamped to the live size) without
    /// copying, for callers that parsed directly out of `read_ptr`/`peek`.
    pub fn consume(&mut self, len: usize) {
        let len = len.min(self.size);
        self.size -= len;
        self.read_index += len;
        if self.size == 0 {
            self.read_index = 0;
        }
        self.maybe_shrink();
    }

    pub fn reset(&mut self) {
        self.size = 0;
        self.read_index = 0;
    }

    fn maybe_shrink(&mut self) {
        if self.capacity <= BUF_DEFAULT_SIZE || self.size * 4 >= self.capacity {
            return;
        }
        let new_capacity = if self.size <= BUF_DEFAULT_SIZE {
            BUF_DEFAULT_SIZE
        } else {
            align_to_power_of_two(self.size)
        };
        if new_capacity >= self.capacity {
            return;
        }
        let mut shrunk = vec![0u8; new_capacity];
        shrunk[..self.size].copy_from_slice(&self.data[self.read_index..self.read_index + self.size]);
        self.data = shrunk;
        self.capacity = new_capacity;
        self.read_index = 0;
    }
}

fn align_to_power_of_two(value: usize) -> usize {
    if value <= BUF_MIN_SIZE {
        return BUF_MIN_SIZE;
    }
    let mut v = value - 1;
    v |= v >> 1;
    v |= v >> 2;
    v |= v >> 4;
    v |= v >> 8;
    v |= v >> 16;
    v |= v >> 32;
    v + 1
}
