use std::fmt;

use memory::MemoryError;

use crate::{config::ConfigError, swap::SwapError, PageId, SpaceId, ThreadId};

#[derive(Debug, PartialEq)]
pub enum MmuError {
    /// The address lies outside the virtual address space or the page table.
    InvalidAddress(u32),
    UnknownSpace(SpaceId),
    UnknownThread(ThreadId),
    UnknownPage(PageId),
    /// No frame can be evicted right now. Retry later.
    OutOfFrames,
    /// The backing store failed a transfer needed to bring the page in.
    IoFailed(PageId),
    ThreadTerminated,
    Config(ConfigError),
    Memory(MemoryError),
    Swap(SwapError),
}

impl fmt::Display for MmuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MmuError::InvalidAddress(a) => write!(f, "invalid virtual address {:#x}", a),
            MmuError::UnknownSpace(s) => write!(f, "unknown address space {}", s),
            MmuError::UnknownThread(t) => write!(f, "unknown thread {}", t),
            MmuError::UnknownPage(p) => write!(f, "unknown page {}", p),
            MmuError::OutOfFrames => write!(f, "out of frames"),
            MmuError::IoFailed(p) => write!(f, "backing store failed for {}", p),
            MmuError::ThreadTerminated => write!(f, "thread terminated"),
            MmuError::Config(e) => write!(f, "config: {}", e),
            MmuError::Memory(e) => write!(f, "memory: {}", e),
            MmuError::Swap(e) => write!(f, "swap: {}", e),
        }
    }
}

impl From<ConfigError> for MmuError {
    fn from(e: ConfigError) -> Self {
        MmuError::Config(e)
    }
}

impl From<MemoryError> for MmuError {
    fn from(e: MemoryError) -> Self {
        MmuError::Memory(e)
    }
}

impl From<SwapError> for MmuError {
    fn from(e: SwapError) -> Self {
        MmuError::Swap(e)
    }
}
