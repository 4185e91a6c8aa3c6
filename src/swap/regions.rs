/// Which swap regions are handed out, one bit per region.
#[derive(Debug, Clone)]
pub struct RegionMap {
    regions: usize,
    bitmap: Vec<u8>,
}

impl RegionMap {
    pub fn new(regions: usize) -> RegionMap {
        let bitmap_len = regions / 8 + if regions % 8 == 0 { 0 } else { 1 };
        RegionMap {
            regions,
            bitmap: vec![0; bitmap_len],
        }
    }

    pub fn allocate(&mut self) -> Option<usize> {
        for i in 0..self.bitmap.len() {
            for j in 0..8 {
                let region = i * 8 + j;
                if region >= self.regions {
                    return None;
                }
                if self.bitmap[i] & (1 << j) == 0 {
                    self.bitmap[i] |= 1 << j;
                    return Some(region);
                }
            }
        }
        None
    }

    pub fn deallocate(&mut self, region: usize) {
        if region < self.regions {
            self.bitmap[region / 8] &= !(1 << (region % 8));
        }
    }

    pub fn is_allocated(&self, region: usize) -> bool {
        region < self.regions && self.bitmap[region / 8] & (1 << (region % 8)) != 0
    }
}
