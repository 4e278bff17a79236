//! Device access used by the burn-in engine.
//!
//! A device is treated as a flat byte range: stream I/O through
//! [`Read`]/[`Write`]/[`Seek`], positional I/O through [`Device::write_at`]
//! and [`Device::read_at`], and a durable [`Device::sync`].

use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{BurnInError, Result, Step};

pub trait Device: Read + Write + Seek {
    /// Write `buf` at `offset`, returning the number of bytes accepted.
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        self.seek(SeekFrom::Start(offset))?;
        self.write(buf)
    }

    /// Read into `buf` from `offset`, returning the number of bytes read.
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.seek(SeekFrom::Start(offset))?;
        self.read(buf)
    }

    /// Force written data to stable storage.
    fn sync(&mut self) -> io::Result<()>;
}

impl Device for File {
    #[cfg(unix)]
    fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
        <File as std::os::unix::fs::FileExt>::write_at(self, buf, offset)
    }

    #[cfg(unix)]
    fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        <File as std::os::unix::fs::FileExt>::read_at(self, buf, offset)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

/// In-memory device, handy for exercising the engine without real storage.
impl Device for Cursor<Vec<u8>> {
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Open `path` read-write without creating it.
///
/// On Linux the open carries `O_EXCL`, which for block devices refuses the
/// open while another holder (a mount, another tester) has it.
pub fn open_device(path: &Path) -> Result<File> {
    let mut opts = OpenOptions::new();
    opts.read(true).write(true).create(false);
    #[cfg(target_os = "linux")]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.custom_flags(libc::O_EXCL);
    }
    opts.open(path).map_err(|source| BurnInError::Device {
        step: Step::Open,
        device: path.display().to_string(),
        source,
    })
}

/// Total addressable size of the device in bytes.
///
/// Seeks to the end and back so it works for block devices, whose metadata
/// length is zero.
pub fn device_size<D: Device + ?Sized>(dev: &mut D, name: &str) -> Result<i64> {
    let size_err = |source| BurnInError::Device {
        step: Step::Size,
        device: name.to_string(),
        source,
    };
    let end = dev.seek(SeekFrom::End(0)).map_err(size_err)?;
    dev.seek(SeekFrom::Start(0)).map_err(size_err)?;
    i64::try_from(end).map_err(|_| {
        size_err(io::Error::new(
            io::ErrorKind::InvalidData,
            "device size overflows i64",
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_restores_position() {
        let mut dev = Cursor::new(vec![0u8; 4096]);
        dev.seek(SeekFrom::Start(100)).unwrap();
        assert_eq!(device_size(&mut dev, "mem").unwrap(), 4096);
        assert_eq!(dev.stream_position().unwrap(), 0);
    }

    #[test]
    fn open_missing_is_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_device(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, BurnInError::Device { step: Step::Open, .. }));
    }

    #[test]
    fn positional_io_on_file() {
        let mut file = tempfile::tempfile().unwrap();
        file.set_len(64).unwrap();
        assert_eq!(Device::write_at(&mut file, b"xyz", 10).unwrap(), 3);
        let mut buf = [0u8; 3];
        assert_eq!(Device::read_at(&mut file, &mut buf, 10).unwrap(), 3);
        assert_eq!(&buf, b"xyz");
        assert_eq!(device_size(&mut file, "tmp").unwrap(), 64);
    }
}
