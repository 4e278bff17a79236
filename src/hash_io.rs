//! Writer adapter that hashes exactly what the underlying device accepted.

use std::io::{self, Write};

use sha2::{Digest, Sha256};

use crate::device::Device;

pub type DigestBytes = [u8; 32];

/// Wraps a device and feeds every accepted byte into a running SHA-256.
///
/// Only the `n` bytes reported by the device are hashed, so a short write
/// leaves the digest matching what actually reached storage.
pub struct HashWriter<'a, D: ?Sized> {
    inner: &'a mut D,
    hasher: Sha256,
}

impl<'a, D: Device + ?Sized> HashWriter<'a, D> {
    pub fn new(inner: &'a mut D) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
        }
    }

    /// Positional write; hashes the accepted prefix of `buf`.
    pub fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        let n = self.inner.write_at(buf, offset)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    pub fn device(&mut self) -> &mut D {
        self.inner
    }

    pub fn finish(self) -> DigestBytes {
        self.hasher.finalize().into()
    }
}

impl<D: Device + ?Sized> Write for HashWriter<'_, D> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Write `buf` through `write` until it is fully accepted or the sink stops
/// taking bytes. Returns the number of bytes accepted.
pub fn write_full<F>(buf: &[u8], mut write: F) -> io::Result<usize>
where
    F: FnMut(&[u8], usize) -> io::Result<usize>,
{
    let mut done = 0;
    while done < buf.len() {
        match write(&buf[done..], done) {
            Ok(0) => break,
            Ok(n) => done += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(done)
}

/// Fill `buf` through `read` until full or end of data. Returns bytes read.
pub fn read_full<F>(buf: &mut [u8], mut read: F) -> io::Result<usize>
where
    F: FnMut(&mut [u8], usize) -> io::Result<usize>,
{
    let mut done = 0;
    while done < buf.len() {
        match read(&mut buf[done..], done) {
            Ok(0) => break,
            Ok(n) => done += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(done)
}
