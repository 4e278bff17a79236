//! The burn-in engine: a contiguous write/read/verify pass followed by a
//! random-block write/read/verify pass over one device.
//!
//! Every byte written is hashed as it is accepted by the device and every byte
//! read back is hashed in the same order; the phase passes only when both
//! SHA-256 digests agree. I/O faults and digest mismatches are reported as
//! distinct errors so corruption is never mistaken for a flaky transfer.

use std::collections::HashSet;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::{TestConfig, BLOCK_SIZE};
use crate::device::{device_size, open_device, Device};
use crate::error::{BurnInError, Phase, Result, Step};
use crate::hash_io::{read_full, write_full, DigestBytes, HashWriter};
use crate::human::{human_rate, human_size};
use crate::plan::TestPlan;
use crate::progress::Progress;

/// Rate achieved by one I/O sub-phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Throughput {
    pub bytes: u64,
    pub elapsed: Duration,
    /// Human readable rate, e.g. `180.00 MB/s`.
    pub rate: String,
}

impl Throughput {
    pub fn measure(bytes: u64, elapsed: Duration) -> Self {
        Self {
            bytes,
            elapsed,
            rate: human_rate(bytes, elapsed),
        }
    }
}

/// Outcome of a completed burn-in run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Wall time across both phases.
    pub elapsed: Duration,
    /// Raw device size in bytes.
    pub size: u64,
    pub human_size: String,
    pub written: u64,
    pub read: u64,
    pub contiguous_write: Throughput,
    pub contiguous_read: Throughput,
    pub random_write: Throughput,
    pub random_read: Throughput,
}

/// Open the device at `path` and run the full burn-in sequence against it.
///
/// The handle is owned for the duration of the run and closed on return.
pub fn test_disk(
    path: &Path,
    config: &TestConfig,
    progress: &dyn Progress,
) -> Result<TestResult> {
    let mut file = open_device(path)?;
    let name = path.display().to_string();
    let result = burn_in(&mut file, &name, config, progress)?;
    // std reports no close errors; both phases already ended in a sync
    drop(file);
    Ok(result)
}

/// Run the contiguous then random phases against an already open device.
pub fn burn_in<D: Device + ?Sized>(
    dev: &mut D,
    name: &str,
    config: &TestConfig,
    progress: &dyn Progress,
) -> Result<TestResult> {
    let size = device_size(dev, name)?;
    let plan = TestPlan::new(size, config.write_budget);
    if plan.phase_bytes == 0 {
        return Err(BurnInError::DeviceTooSmall {
            device: name.to_string(),
            size,
        });
    }
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let start = Instant::now();
    let (contiguous_write, contiguous_read) =
        contiguous_phase(dev, name, plan.phase_bytes, &mut rng, progress)?;
    debug!(
        device = name,
        write = %contiguous_write.rate,
        read = %contiguous_read.rate,
        "contiguous phase verified"
    );
    let (random_write, random_read) = random_phase(dev, name, &plan, &mut rng, progress)?;
    debug!(
        device = name,
        write = %random_write.rate,
        read = %random_read.rate,
        "random phase verified"
    );

    let total = plan.total_bytes() as u64;
    Ok(TestResult {
        elapsed: start.elapsed(),
        size: size as u64,
        human_size: human_size(size as u64),
        written: total,
        read: total,
        contiguous_write,
        contiguous_read,
        random_write,
        random_read,
    })
}

fn io_err(step: Step, device: &str) -> impl Fn(std::io::Error) -> BurnInError + '_ {
    move |source| BurnInError::Device {
        step,
        device: device.to_string(),
        source,
    }
}

fn check_transfer(step: Step, device: &str, expected: i64, actual: i64) -> Result<()> {
    if expected != actual {
        return Err(BurnInError::ShortTransfer {
            step,
            device: device.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

fn check_digests(
    phase: Phase,
    device: &str,
    written: DigestBytes,
    read: DigestBytes,
) -> Result<()> {
    if written != read {
        return Err(BurnInError::Integrity {
            phase,
            device: device.to_string(),
            written: hex::encode(written),
            read: hex::encode(read),
        });
    }
    Ok(())
}

fn contiguous_phase<D: Device + ?Sized>(
    dev: &mut D,
    name: &str,
    bytes: i64,
    rng: &mut StdRng,
    progress: &dyn Progress,
) -> Result<(Throughput, Throughput)> {
    let mut block = vec![0u8; BLOCK_SIZE as usize];

    dev.seek(SeekFrom::Start(0)).map_err(io_err(Step::Seek, name))?;
    progress.begin(Phase::Contiguous, "write", bytes as u64);
    let start = Instant::now();
    let mut hw = HashWriter::new(dev);
    let mut written = 0i64;
    while written < bytes {
        let chunk = (bytes - written).min(BLOCK_SIZE) as usize;
        rng.fill_bytes(&mut block[..chunk]);
        let n = write_full(&block[..chunk], |b, _| hw.write(b))
            .map_err(io_err(Step::Write, name))?;
        written += n as i64;
        progress.advance(n as u64);
        if n < chunk {
            break;
        }
    }
    check_transfer(Step::Write, name, bytes, written)?;
    hw.device().sync().map_err(io_err(Step::Sync, name))?;
    let write_digest = hw.finish();
    let write_rate = Throughput::measure(bytes as u64, start.elapsed());

    dev.seek(SeekFrom::Start(0)).map_err(io_err(Step::Seek, name))?;
    progress.begin(Phase::Contiguous, "read", bytes as u64);
    let start = Instant::now();
    let mut hasher = Sha256::new();
    let mut read = 0i64;
    while read < bytes {
        let chunk = (bytes - read).min(BLOCK_SIZE) as usize;
        let n = read_full(&mut block[..chunk], |b, _| dev.read(b))
            .map_err(io_err(Step::Read, name))?;
        hasher.update(&block[..n]);
        read += n as i64;
        progress.advance(n as u64);
        if n < chunk {
            break;
        }
    }
    check_transfer(Step::Read, name, bytes, read)?;
    let read_rate = Throughput::measure(bytes as u64, start.elapsed());

    check_digests(Phase::Contiguous, name, write_digest, hasher.finalize().into())?;
    Ok((write_rate, read_rate))
}

fn random_phase<D: Device + ?Sized>(
    dev: &mut D,
    name: &str,
    plan: &TestPlan,
    rng: &mut StdRng,
    progress: &dyn Progress,
) -> Result<(Throughput, Throughput)> {
    let offsets = pick_blocks(rng, plan.random_blocks(), plan.total_blocks());

    progress.begin(Phase::Random, "write", plan.phase_bytes as u64);
    let start = Instant::now();
    let write_digest = write_blocks(dev, name, &offsets, rng, progress)?;
    dev.sync().map_err(io_err(Step::Sync, name))?;
    let write_rate = Throughput::measure(plan.phase_bytes as u64, start.elapsed());

    progress.begin(Phase::Random, "read", plan.phase_bytes as u64);
    let start = Instant::now();
    let read_digest = read_blocks(dev, name, &offsets, progress)?;
    let read_rate = Throughput::measure(plan.phase_bytes as u64, start.elapsed());

    check_digests(Phase::Random, name, write_digest, read_digest)?;
    Ok((write_rate, read_rate))
}

/// Choose `count` distinct blocks out of `total`, returned as byte offsets in
/// draw order. Collisions are redrawn.
pub fn pick_blocks<R: Rng>(rng: &mut R, count: i64, total: i64) -> Vec<i64> {
    let count = count.min(total).max(0);
    let mut used = HashSet::with_capacity(count as usize);
    let mut offsets = Vec::with_capacity(count as usize);
    while (offsets.len() as i64) < count {
        let block = rng.gen_range(0..total);
        if used.insert(block) {
            offsets.push(block * BLOCK_SIZE);
        }
    }
    offsets
}

/// Fill each block at `offsets` with fresh random data, hashing the content
/// in write order.
pub fn write_blocks<D: Device + ?Sized, R: RngCore + ?Sized>(
    dev: &mut D,
    name: &str,
    offsets: &[i64],
    rng: &mut R,
    progress: &dyn Progress,
) -> Result<DigestBytes> {
    let mut block = vec![0u8; BLOCK_SIZE as usize];
    let mut hw = HashWriter::new(dev);
    for &offset in offsets {
        rng.fill_bytes(&mut block);
        let n = write_full(&block, |b, done| hw.write_at(b, (offset + done as i64) as u64))
            .map_err(io_err(Step::Write, name))?;
        check_transfer(Step::Write, name, BLOCK_SIZE, n as i64)?;
        progress.advance(n as u64);
    }
    Ok(hw.finish())
}

/// Read back each block at `offsets` in the given order, hashing as it goes.
pub fn read_blocks<D: Device + ?Sized>(
    dev: &mut D,
    name: &str,
    offsets: &[i64],
    progress: &dyn Progress,
) -> Result<DigestBytes> {
    let mut block = vec![0u8; BLOCK_SIZE as usize];
    let mut hasher = Sha256::new();
    for &offset in offsets {
        let n = read_full(&mut block, |b, done| dev.read_at(b, (offset + done as i64) as u64))
            .map_err(io_err(Step::Read, name))?;
        check_transfer(Step::Read, name, BLOCK_SIZE, n as i64)?;
        hasher.update(&block);
        progress.advance(n as u64);
    }
    Ok(hasher.finalize().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use proptest::prelude::*;
    use std::io::{self, Cursor};

    const MIB: usize = BLOCK_SIZE as usize;

    #[derive(Clone, Copy, PartialEq)]
    enum Fault {
        None,
        FlipStreamRead,
        FlipPositionalRead,
        WriteLimit(usize),
        PositionalWriteLimit(usize),
        ReadLimit(usize),
        FailRead,
    }

    struct FaultyDevice {
        inner: Cursor<Vec<u8>>,
        fault: Fault,
        written: usize,
        positional_written: usize,
        read: usize,
    }

    impl FaultyDevice {
        fn new(size: usize, fault: Fault) -> Self {
            Self {
                inner: Cursor::new(vec![0u8; size]),
                fault,
                written: 0,
                positional_written: 0,
                read: 0,
            }
        }
    }

    impl Read for FaultyDevice {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.fault == Fault::FailRead {
                return Err(io::Error::new(io::ErrorKind::Other, "media error"));
            }
            let room = match self.fault {
                Fault::ReadLimit(limit) => limit.saturating_sub(self.read),
                _ => usize::MAX,
            };
            let want = buf.len().min(room);
            if want == 0 {
                return Ok(0);
            }
            let n = self.inner.read(&mut buf[..want])?;
            self.read += n;
            if self.fault == Fault::FlipStreamRead && n > 0 {
                buf[0] ^= 0xff;
            }
            Ok(n)
        }
    }

    impl Write for FaultyDevice {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let room = match self.fault {
                Fault::WriteLimit(limit) => limit.saturating_sub(self.written),
                _ => usize::MAX,
            };
            let n = buf.len().min(room);
            if n == 0 {
                return Ok(0);
            }
            let n = self.inner.write(&buf[..n])?;
            self.written += n;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Seek for FaultyDevice {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.inner.seek(pos)
        }
    }

    impl Device for FaultyDevice {
        fn write_at(&mut self, buf: &[u8], offset: u64) -> io::Result<usize> {
            let room = match self.fault {
                Fault::PositionalWriteLimit(limit) => {
                    limit.saturating_sub(self.positional_written)
                }
                _ => usize::MAX,
            };
            let want = buf.len().min(room);
            if want == 0 {
                return Ok(0);
            }
            self.seek(SeekFrom::Start(offset))?;
            let n = self.write(&buf[..want])?;
            self.positional_written += n;
            Ok(n)
        }

        fn read_at(&mut self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
            self.seek(SeekFrom::Start(offset))?;
            let n = self.read(buf)?;
            if self.fault == Fault::FlipPositionalRead && n > 0 {
                buf[n - 1] ^= 0x01;
            }
            Ok(n)
        }

        fn sync(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn config(budget: i64) -> TestConfig {
        TestConfig::from_bytes(budget).unwrap().with_seed(7)
    }

    #[test]
    fn clean_device_passes() {
        let mut dev = Cursor::new(vec![0u8; 8 * MIB + 100]);
        let res = burn_in(&mut dev, "mem", &config(8 * BLOCK_SIZE), &NoProgress).unwrap();
        assert_eq!(res.size, (8 * MIB + 100) as u64);
        assert_eq!(res.written, 8 * BLOCK_SIZE as u64);
        assert_eq!(res.read, res.written);
        assert_eq!(res.contiguous_write.bytes, 4 * BLOCK_SIZE as u64);
        assert_eq!(res.random_read.bytes, 4 * BLOCK_SIZE as u64);
        assert_eq!(res.human_size, "8.00 MB");
    }

    #[test]
    fn budget_larger_than_device_is_capped() {
        let mut dev = Cursor::new(vec![0u8; 3 * MIB]);
        let res = burn_in(&mut dev, "mem", &config(64 * BLOCK_SIZE), &NoProgress).unwrap();
        assert_eq!(res.written, 6 * BLOCK_SIZE as u64);
    }

    #[test]
    fn tiny_device_rejected() {
        let mut dev = Cursor::new(vec![0u8; MIB - 1]);
        let err = burn_in(&mut dev, "mem", &config(2 * BLOCK_SIZE), &NoProgress).unwrap_err();
        assert!(matches!(err, BurnInError::DeviceTooSmall { .. }));
    }

    #[test]
    fn contiguous_corruption_is_integrity_failure() {
        let mut dev = FaultyDevice::new(4 * MIB, Fault::FlipStreamRead);
        let err = burn_in(&mut dev, "bad", &config(4 * BLOCK_SIZE), &NoProgress).unwrap_err();
        assert!(err.is_integrity());
        assert!(matches!(
            err,
            BurnInError::Integrity {
                phase: Phase::Contiguous,
                ..
            }
        ));
    }

    #[test]
    fn random_corruption_is_integrity_failure() {
        let mut dev = FaultyDevice::new(4 * MIB, Fault::FlipPositionalRead);
        let err = burn_in(&mut dev, "bad", &config(4 * BLOCK_SIZE), &NoProgress).unwrap_err();
        assert!(matches!(
            err,
            BurnInError::Integrity {
                phase: Phase::Random,
                ..
            }
        ));
    }

    #[test]
    fn short_write_is_io_failure() {
        let mut dev = FaultyDevice::new(4 * MIB, Fault::WriteLimit(MIB + 5));
        let err = burn_in(&mut dev, "short", &config(4 * BLOCK_SIZE), &NoProgress).unwrap_err();
        assert!(!err.is_integrity());
        match err {
            BurnInError::ShortTransfer {
                step,
                expected,
                actual,
                ..
            } => {
                assert_eq!(step, Step::Write);
                assert_eq!(expected, 2 * BLOCK_SIZE);
                assert_eq!(actual, BLOCK_SIZE + 5);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    fn short_transfer(err: BurnInError) -> (Step, i64, i64) {
        assert!(!err.is_integrity());
        match err {
            BurnInError::ShortTransfer {
                step,
                expected,
                actual,
                ..
            } => (step, expected, actual),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn short_contiguous_read_is_io_failure() {
        let mut dev = FaultyDevice::new(4 * MIB, Fault::ReadLimit(MIB + 7));
        let err = burn_in(&mut dev, "short", &config(4 * BLOCK_SIZE), &NoProgress).unwrap_err();
        assert_eq!(
            short_transfer(err),
            (Step::Read, 2 * BLOCK_SIZE, BLOCK_SIZE + 7)
        );
    }

    #[test]
    fn short_random_read_is_io_failure() {
        // contiguous read-back consumes the first 2 MiB of the allowance
        let mut dev = FaultyDevice::new(4 * MIB, Fault::ReadLimit(2 * MIB + 9));
        let err = burn_in(&mut dev, "short", &config(4 * BLOCK_SIZE), &NoProgress).unwrap_err();
        assert_eq!(short_transfer(err), (Step::Read, BLOCK_SIZE, 9));
    }

    #[test]
    fn short_random_write_is_io_failure() {
        let mut dev = FaultyDevice::new(4 * MIB, Fault::PositionalWriteLimit(MIB + 3));
        let err = burn_in(&mut dev, "short", &config(4 * BLOCK_SIZE), &NoProgress).unwrap_err();
        assert_eq!(short_transfer(err), (Step::Write, BLOCK_SIZE, 3));
    }

    #[test]
    fn read_error_names_step_and_device() {
        let mut dev = FaultyDevice::new(4 * MIB, Fault::FailRead);
        let err = burn_in(&mut dev, "flaky", &config(4 * BLOCK_SIZE), &NoProgress).unwrap_err();
        assert!(matches!(
            &err,
            BurnInError::Device { step: Step::Read, device, .. } if device == "flaky"
        ));
        assert!(err.to_string().contains("flaky"));
    }

    #[test]
    fn fault_free_wrapper_passes() {
        let mut dev = FaultyDevice::new(4 * MIB, Fault::None);
        burn_in(&mut dev, "ok", &config(4 * BLOCK_SIZE), &NoProgress).unwrap();
    }

    #[test]
    fn block_digests_match_in_write_order() {
        let mut dev = Cursor::new(vec![0u8; 16 * MIB]);
        let mut rng = StdRng::seed_from_u64(11);
        let offsets = pick_blocks(&mut rng, 6, 16);
        let written = write_blocks(&mut dev, "mem", &offsets, &mut rng, &NoProgress).unwrap();
        let read = read_blocks(&mut dev, "mem", &offsets, &NoProgress).unwrap();
        assert_eq!(written, read);

        let mut reversed = offsets.clone();
        reversed.reverse();
        let out_of_order = read_blocks(&mut dev, "mem", &reversed, &NoProgress).unwrap();
        assert_ne!(written, out_of_order);

        dev.get_mut()[offsets[3] as usize + 42] ^= 0x80;
        let corrupted = read_blocks(&mut dev, "mem", &offsets, &NoProgress).unwrap();
        assert_ne!(written, corrupted);
    }

    #[test]
    fn full_coverage_pick() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut blocks: Vec<i64> = pick_blocks(&mut rng, 32, 32)
            .into_iter()
            .map(|o| o / BLOCK_SIZE)
            .collect();
        blocks.sort_unstable();
        assert_eq!(blocks, (0..32).collect::<Vec<_>>());
        assert!(pick_blocks(&mut rng, 4, 0).is_empty());
    }

    proptest! {
        #[test]
        fn picked_blocks_distinct_and_aligned(
            seed in any::<u64>(),
            total in 1i64..512,
            frac in 0.0f64..=1.0,
        ) {
            let count = ((total as f64) * frac) as i64;
            let mut rng = StdRng::seed_from_u64(seed);
            let offsets = pick_blocks(&mut rng, count, total);
            prop_assert_eq!(offsets.len() as i64, count);
            let unique: HashSet<_> = offsets.iter().collect();
            prop_assert_eq!(unique.len(), offsets.len());
            for off in offsets {
                prop_assert_eq!(off % BLOCK_SIZE, 0);
                prop_assert!(off >= 0 && off < total * BLOCK_SIZE);
            }
        }
    }
}
