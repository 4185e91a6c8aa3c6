use std::{
    fmt,
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    mem::size_of,
    sync::{Arc, Mutex},
};

use log::info;

#[derive(Debug)]
pub enum DiskError {
    IncorrectBlockSize,
    OverCapacity,
    InvalidHeader,
    Io(std::io::Error),
}

impl PartialEq for DiskError {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (DiskError::IncorrectBlockSize, DiskError::IncorrectBlockSize)
                | (DiskError::OverCapacity, DiskError::OverCapacity)
                | (DiskError::InvalidHeader, DiskError::InvalidHeader)
                | (DiskError::Io(_), DiskError::Io(_))
        )
    }
}

impl fmt::Display for DiskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskError::IncorrectBlockSize => write!(f, "incorrect block size"),
            DiskError::OverCapacity => write!(f, "block number over capacity"),
            DiskError::InvalidHeader => write!(f, "disk image header does not match"),
            DiskError::Io(e) => write!(f, "disk io: {}", e),
        }
    }
}

impl From<std::io::Error> for DiskError {
    fn from(e: std::io::Error) -> Self {
        DiskError::Io(e)
    }
}

const HEADER_SIZE: usize = size_of::<u32>() * 2;

/// A block device stored in a single image file.
///
/// The image starts with a header of two big-endian words (block size and
/// number of blocks) followed by the blocks themselves.
#[derive(Debug, Clone)]
pub struct Disk {
    file_name: String,
    block_size: usize,
    blocks: usize,
    file: Arc<Mutex<File>>,
}

pub fn make_name(name: &str) -> String {
    let name = name.replace("-", "_");
    let mut disk_name = String::from("SWAP_IMAGE_");
    disk_name.push_str(&name);
    disk_name
}

fn write_header(file: &mut File, block_size: u32, blocks: u32) -> Result<(), std::io::Error> {
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&block_size.to_be_bytes())?;
    file.write_all(&blocks.to_be_bytes())?;
    Ok(())
}

fn read_header(file: &mut File) -> Result<(u32, u32), std::io::Error> {
    let mut block_size = [0; size_of::<u32>()];
    let mut blocks = [0; size_of::<u32>()];
    file.seek(SeekFrom::Start(0))?;
    file.read_exact(&mut block_size)?;
    file.read_exact(&mut blocks)?;
    Ok((u32::from_be_bytes(block_size), u32::from_be_bytes(blocks)))
}

impl Disk {
    pub fn create(name: &str, block_size: usize, blocks: usize) -> Result<Self, DiskError> {
        if block_size == 0 {
            return Err(DiskError::IncorrectBlockSize);
        }
        let mut file = File::options()
            .truncate(true)
            .write(true)
            .read(true)
            .create(true)
            .open(make_name(name))?;
        file.set_len((HEADER_SIZE + block_size * blocks) as u64)?;
        write_header(&mut file, block_size as u32, blocks as u32)?;
        info!(
            "Created disk {} ({} blocks of {} bytes)",
            name, blocks, block_size
        );
        Ok(Self {
            file_name: String::from(name),
            block_size,
            blocks,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn connect(name: &str, block_size: usize, blocks: usize) -> Result<Self, DiskError> {
        let mut file = File::options()
            .write(true)
            .read(true)
            .open(make_name(name))?;
        let header = read_header(&mut file)?;
        if header != (block_size as u32, blocks as u32) {
            return Err(DiskError::InvalidHeader);
        }
        Ok(Self {
            file_name: String::from(name),
            block_size,
            blocks,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn name(&self) -> &str {
        &self.file_name
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn blocks(&self) -> usize {
        self.blocks
    }

    fn offset(&self, block_number: usize) -> u64 {
        HEADER_SIZE as u64 + (block_number * self.block_size) as u64
    }

    pub fn read_block(&self, block_number: usize, buf: &mut [u8]) -> Result<(), DiskError> {
        if buf.len() != self.block_size {
            return Err(DiskError::IncorrectBlockSize);
        } else if block_number >= self.blocks {
            return Err(DiskError::OverCapacity);
        }
        let mut file = self.file.lock().map_err(|_| {
            DiskError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk lock poisoned",
            ))
        })?;
        info!("Start reading block[{}]", block_number);
        file.seek(SeekFrom::Start(self.offset(block_number)))?;
        file.read_exact(buf)?;
        info!("Done reading block[{}]", block_number);
        Ok(())
    }

    pub fn write_block(&self, block_number: usize, block: &[u8]) -> Result<(), DiskError> {
        if block.len() != self.block_size {
            return Err(DiskError::IncorrectBlockSize);
        } else if block_number >= self.blocks {
            return Err(DiskError::OverCapacity);
        }
        let mut file = self.file.lock().map_err(|_| {
            DiskError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk lock poisoned",
            ))
        })?;
        info!("Start writing block[{}]", block_number);
        file.seek(SeekFrom::Start(self.offset(block_number)))?;
        file.write_all(block)?;
        info!("Done writing block[{}]", block_number);
        Ok(())
    }
}
