use std::fmt;

pub const DEFAULT_VIRTUAL_ADDRESS_BITS: u32 = 16;
pub const DEFAULT_PAGE_ADDRESS_BITS: u32 = 6;
pub const DEFAULT_FRAME_COUNT: usize = 16;

/// Largest page: 64 KiB.
pub const MAX_OFFSET_BITS: u32 = 16;
/// Largest page table: 2^20 entries per address space.
pub const MAX_PAGE_ADDRESS_BITS: u32 = 20;
/// Largest physical memory: 256 MiB.
pub const MAX_MEMORY_BYTES: usize = 1 << 28;

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    AddressBitsTooLarge,
    PageBitsTooLarge,
    PageTooLarge,
    TooManyPages,
    NoFrames,
    MemoryTooLarge,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::AddressBitsTooLarge => write!(f, "virtual addresses are at most 32 bits"),
            ConfigError::PageBitsTooLarge => {
                write!(f, "page number bits must leave at least one offset bit")
            }
            ConfigError::PageTooLarge => {
                write!(f, "pages are at most 2^{} bytes", MAX_OFFSET_BITS)
            }
            ConfigError::TooManyPages => {
                write!(f, "page numbers are at most {} bits", MAX_PAGE_ADDRESS_BITS)
            }
            ConfigError::NoFrames => write!(f, "the frame table needs at least one frame"),
            ConfigError::MemoryTooLarge => {
                write!(f, "physical memory is at most {} bytes", MAX_MEMORY_BYTES)
            }
        }
    }
}

/// Sizing of the paging core. Fixed for the lifetime of an `Mmu`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmuConfig {
    pub virtual_address_bits: u32,
    /// Bits of a virtual address that select the page.
    pub page_address_bits: u32,
    pub frame_count: usize,
    /// Fall back to the highest-index frame when no frame is evictable,
    /// even if it is pinned or reserved. Off by default: exhausting the
    /// eviction tiers reports out-of-frames instead.
    pub last_resort_victim: bool,
}

impl Default for MmuConfig {
    fn default() -> Self {
        MmuConfig {
            virtual_address_bits: DEFAULT_VIRTUAL_ADDRESS_BITS,
            page_address_bits: DEFAULT_PAGE_ADDRESS_BITS,
            frame_count: DEFAULT_FRAME_COUNT,
            last_resort_victim: false,
        }
    }
}

impl MmuConfig {
    pub fn new(virtual_address_bits: u32, page_address_bits: u32, frame_count: usize) -> Self {
        MmuConfig {
            virtual_address_bits,
            page_address_bits,
            frame_count,
            last_resort_victim: false,
        }
    }

    pub fn with_last_resort_victim(mut self, enabled: bool) -> Self {
        self.last_resort_victim = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.virtual_address_bits > 32 {
            return Err(ConfigError::AddressBitsTooLarge);
        }
        if self.page_address_bits >= self.virtual_address_bits {
            return Err(ConfigError::PageBitsTooLarge);
        }
        if self.offset_bits() > MAX_OFFSET_BITS {
            return Err(ConfigError::PageTooLarge);
        }
        if self.page_address_bits > MAX_PAGE_ADDRESS_BITS {
            return Err(ConfigError::TooManyPages);
        }
        if self.frame_count == 0 {
            return Err(ConfigError::NoFrames);
        }
        match self.page_size().checked_mul(self.frame_count) {
            Some(bytes) if bytes <= MAX_MEMORY_BYTES => Ok(()),
            _ => Err(ConfigError::MemoryTooLarge),
        }
    }

    pub fn offset_bits(&self) -> u32 {
        self.virtual_address_bits - self.page_address_bits
    }

    pub fn page_size(&self) -> usize {
        1 << self.offset_bits()
    }

    pub fn pages_per_space(&self) -> usize {
        1 << self.page_address_bits
    }

    pub fn page_number(&self, address: u32) -> usize {
        address.checked_shr(self.offset_bits()).unwrap_or(0) as usize
    }

    pub fn page_offset(&self, address: u32) -> usize {
        (address as usize) & (self.page_size() - 1)
    }

    /// Whether `address` fits in the virtual address space.
    pub fn contains(&self, address: u32) -> bool {
        self.virtual_address_bits == 32 || address < (1u32 << self.virtual_address_bits)
    }
}
