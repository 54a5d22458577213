use crate::error::DispatchError;

/// Writer half of the reflection-free binary grammar: `u16|u32|u64` are
/// big-endian, a `string` is `u32 length | bytes`, and a homogeneous
/// container is `u32 count | encode(elem)×count`. Composites nest by
/// calling `push_container`/`push_pair` with a closure that itself writes
/// a composite.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn push_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn push_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn push_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn push_string(&mut self, s: &str) {
        self.push_u32(s.len() as u32);
        self.buf.extend_from_slice(s.as_bytes());
    }

    /// Writes `a` then `b`, i.e. `pair(a,b) = encode(a) || encode(b)`.
    pub fn push_pair(&mut self, write_a: impl FnOnce(&mut Self), write_b: impl FnOnce(&mut Self)) {
        write_a(self);
        write_b(self);
    }

    /// Writes a homogeneous container: `u32 count | encode(elem)×count`.
    /// `write_elem` is invoked once per item in iteration order.
    pub fn push_container<T>(&mut self, items: &[T], mut write_elem: impl FnMut(&mut Self, &T)) {
        self.push_u32(items.len() as u32);
        for item in items {
            write_elem(self, item);
        }
    }
}

/// Reader half of the binary grammar. Advances a cursor over a borrowed
/// slice; never copies, never reconciles its cursor with any `Buffer`
/// read index. A `PayloadReader` MUST be constructed fresh per inbound
/// frame and MUST NOT outlive the borrowed payload slice it was built
/// from, since its cursor is never reconciled back against the buffer
/// the frame came from.
pub struct PayloadReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DispatchError> {
        if self.bytes.len() - self.pos < n {
            return Err(DispatchError::Binary("payload truncated"));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u16(&mut self) -> Result<u16, DispatchError> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    pub fn read_u32(&mut self) -> Result<u32, DispatchError> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> Result<u64, DispatchError> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_string(&mut self) -> Result<String, DispatchError> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DispatchError::Binary("invalid utf-8 string"))
    }

    pub fn read_pair<A, B>(
        &mut self,
        read_a: impl FnOnce(&mut Self) -> Result<A, DispatchError>,
        read_b: impl FnOnce(&mut Self) -> Result<B, DispatchError>,
    ) -> Result<(A, B), DispatchError> {
        let a = read_a(self)?;
        let b = read_b(self)?;
        Ok((a, b))
    }

    pub fn read_container<T>(
        &mut self,
        mut read_elem: impl FnMut(&mut Self) -> Result<T, DispatchError>,
    ) -> Result<Vec<T>, DispatchError> {
        let count = self.read_u32()? as usize;
        let mut out = Vec::with_capacity(count.min(1 << 16));
        for _ in 0..count {
            out.push(read_elem(self)?);
        }
        Ok(out)
    }
}
