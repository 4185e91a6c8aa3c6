use std::fmt;

#[derive(Debug, PartialEq, Eq)]
pub enum MemoryError {
    OverCapacity,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::OverCapacity => write!(f, "physical address over capacity"),
        }
    }
}

/// Contents of every physical frame, laid out frame after frame.
#[derive(Debug, Clone)]
pub struct PhysicalMemory {
    frame_size: usize,
    frames: usize,
    buffer: Vec<u8>,
}

impl PhysicalMemory {
    pub fn new(frame_size: usize, frames: usize) -> Self {
        PhysicalMemory {
            frame_size,
            frames,
            buffer: vec![0; frame_size * frames],
        }
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn check_address(&self, address: usize) -> Result<(), MemoryError> {
        if address >= self.capacity() {
            return Err(MemoryError::OverCapacity);
        }
        Ok(())
    }

    pub fn read_u8(&self, address: usize) -> Result<u8, MemoryError> {
        self.check_address(address)?;
        Ok(self.buffer[address])
    }

    pub fn write_u8(&mut self, address: usize, byte: u8) -> Result<(), MemoryError> {
        self.check_address(address)?;
        self.buffer[address] = byte;
        Ok(())
    }

    pub fn frame(&self, frame_number: usize) -> Result<&[u8], MemoryError> {
        if frame_number >= self.frames {
            return Err(MemoryError::OverCapacity);
        }
        let start = frame_number * self.frame_size;
        Ok(&self.buffer[start..start + self.frame_size])
    }

    pub fn frame_mut(&mut self, frame_number: usize) -> Result<&mut [u8], MemoryError> {
        if frame_number >= self.frames {
            return Err(MemoryError::OverCapacity);
        }
        let start = frame_number * self.frame_size;
        Ok(&mut self.buffer[start..start + self.frame_size])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_zeroed() {
        let mem = PhysicalMemory::new(512, 2);
        assert_eq!(mem.capacity(), 1024);
        assert_eq!(mem.read_u8(0).unwrap(), 0);
        assert_eq!(mem.read_u8(1023).unwrap(), 0);
    }

    #[test]
    fn test_read_write() {
        let mut mem = PhysicalMemory::new(512, 2);
        mem.write_u8(0, 0x12).unwrap();
        assert_eq!(mem.read_u8(0).unwrap(), 0x12);
    }

    #[test]
    fn test_write_invalid_address() {
        let mut mem = PhysicalMemory::new(512, 2);
        assert_eq!(mem.write_u8(1024, 0x12), Err(MemoryError::OverCapacity));
        assert_eq!(mem.read_u8(4096), Err(MemoryError::OverCapacity));
    }

    #[test]
    fn test_frame_slices() {
        let mut mem = PhysicalMemory::new(16, 4);
        mem.frame_mut(2).unwrap().copy_from_slice(&[0xa; 16]);
        assert_eq!(mem.read_u8(31).unwrap(), 0);
        assert_eq!(mem.read_u8(32).unwrap(), 0xa);
        assert_eq!(mem.read_u8(47).unwrap(), 0xa);
        assert_eq!(mem.read_u8(48).unwrap(), 0);
        assert_eq!(mem.frame(2).unwrap(), &[0xa; 16]);
        assert!(mem.frame(4).is_err());
    }
}
