//! Fixed-layout region shared between the controller and one worker.
//!
//! Wire layout (little-endian):
//!
//! | offset | size | field            |
//! |--------|------|------------------|
//! | 0      | 4    | ready flag (0/1) |
//! | 4      | 4    | payload length   |
//! | 8      | ..   | payload bytes    |
//!
//! The region lives behind a mutex and a condvar stands in for atomic
//! wait/notify on the flag word. The flag store is the synchronization edge:
//! payload and length are always written before it and read after it.

use parking_lot::Condvar;
use parking_lot::Mutex;
use parking_lot::MutexGuard;

use crate::error::Result;
use crate::error::RunpadError;

pub const FLAG_OFFSET: usize = 0;
pub const LENGTH_OFFSET: usize = 4;
pub const PAYLOAD_OFFSET: usize = 8;
pub const HEADER_SIZE: usize = PAYLOAD_OFFSET;
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;
/// Header plus one byte of text and its terminator.
pub const MIN_BLOCK_SIZE: usize = HEADER_SIZE + 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ReadyFlag {
    Empty = 0,
    Full = 1,
}

impl ReadyFlag {
    fn from_word(word: u32) -> Self {
        if word == ReadyFlag::Full as u32 {
            ReadyFlag::Full
        } else {
            ReadyFlag::Empty
        }
    }
}

#[derive(Debug)]
pub struct ControlBlock {
    region: Mutex<Region>,
    ready: Condvar,
}

#[derive(Debug)]
pub(crate) struct Region {
    bytes: Box<[u8]>,
    terminated: bool,
}

impl ControlBlock {
    pub fn new(size: usize) -> Result<Self> {
        if size < MIN_BLOCK_SIZE {
            return Err(RunpadError::InvalidBlockSize {
                size,
                minimum: MIN_BLOCK_SIZE,
            });
        }
        Ok(Self {
            region: Mutex::new(Region {
                bytes: vec![0u8; size].into_boxed_slice(),
                terminated: false,
            }),
            ready: Condvar::new(),
        })
    }

    pub fn size(&self) -> usize {
        self.region.lock().bytes.len()
    }

    /// Bytes available for a staged line, terminator included.
    pub fn capacity(&self) -> usize {
        self.size() - HEADER_SIZE
    }

    pub fn ready_flag(&self) -> ReadyFlag {
        self.region.lock().flag()
    }

    pub fn payload_len(&self) -> usize {
        self.region.lock().payload_len()
    }

    pub fn is_terminated(&self) -> bool {
        self.region.lock().terminated
    }

    /// Copy of the raw region, header included.
    pub fn wire_bytes(&self) -> Vec<u8> {
        self.region.lock().bytes.to_vec()
    }

    /// Tears the block down and wakes every thread parked on the flag.
    pub fn terminate(&self) {
        let mut region = self.region.lock();
        region.terminated = true;
        drop(region);
        self.ready.notify_all();
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Region> {
        self.region.lock()
    }

    pub(crate) fn notify(&self) {
        self.ready.notify_all();
    }

    /// Parks the calling thread until the flag reads `Full` or the block is
    /// terminated. Returns the guard with the region still locked.
    pub(crate) fn wait_full(&self) -> MutexGuard<'_, Region> {
        let mut region = self.region.lock();
        while region.flag() != ReadyFlag::Full && !region.terminated {
            self.ready.wait(&mut region);
        }
        region
    }
}

impl Region {
    pub(crate) fn flag(&self) -> ReadyFlag {
        ReadyFlag::from_word(self.read_word(FLAG_OFFSET))
    }

    pub(crate) fn set_flag(&mut self, flag: ReadyFlag) {
        self.write_word(FLAG_OFFSET, flag as u32);
    }

    pub(crate) fn payload_len(&self) -> usize {
        self.read_word(LENGTH_OFFSET) as usize
    }

    pub(crate) fn capacity(&self) -> usize {
        self.bytes.len() - HEADER_SIZE
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Writes payload then length. Callers store the flag afterwards.
    pub(crate) fn stage(&mut self, payload: &[u8]) {
        debug_assert!(payload.len() <= self.capacity());
        let end = PAYLOAD_OFFSET + payload.len();
        self.bytes[PAYLOAD_OFFSET..end].copy_from_slice(payload);
        self.write_word(LENGTH_OFFSET, payload.len() as u32);
    }

    pub(crate) fn staged(&self) -> &[u8] {
        let len = self.payload_len().min(self.capacity());
        &self.bytes[PAYLOAD_OFFSET..PAYLOAD_OFFSET + len]
    }

    fn read_word(&self, offset: usize) -> u32 {
        let mut word = [0u8; 4];
        word.copy_from_slice(&self.bytes[offset..offset + 4]);
        u32::from_le_bytes(word)
    }

    fn write_word(&mut self, offset: usize, value: u32) {
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}
