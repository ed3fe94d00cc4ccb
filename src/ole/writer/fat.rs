//! Sector allocation table
//!
//! Each entry holds the next sector of its chain, `ENDOFCHAIN`, or the
//! `FATSECT`/`DIFSECT` marker for sectors holding the tables themselves.
//!
//! # Implementation Notes
//!
//! Sectors are never freed or reused. Each allocation extends the table at
//! its end, which keeps every chain contiguous and every link pointing
//! forward.

use super::super::consts::*;

/// Hands out sectors front to back, one contiguous chain at a time
#[derive(Debug)]
pub struct FatBuilder {
    fat: Vec<u32>,
    next_sector: u32,
    sector_size: usize,
}

impl FatBuilder {
    pub fn new(sector_size: usize) -> Self {
        Self {
            fat: Vec::new(),
            next_sector: 0,
            sector_size,
        }
    }

    /// Allocate a contiguous chain of sectors for `size` bytes
    ///
    /// # Arguments
    ///
    /// * `size` - Byte length of the data the chain will hold
    ///
    /// # Returns
    ///
    /// The first sector of the chain, or `ENDOFCHAIN` for empty data
    pub fn allocate_chain(&mut self, size: usize) -> u32 {
        if size == 0 {
            return ENDOFCHAIN;
        }

        let num_sectors = size.div_ceil(self.sector_size) as u32;
        let start = self.next_sector;
        let end = start + num_sectors;
        self.fat.resize(end as usize, FREESECT);

        for sector in start..end - 1 {
            self.fat[sector as usize] = sector + 1;
        }
        self.fat[(end - 1) as usize] = ENDOFCHAIN;

        self.next_sector = end;
        start
    }

    /// Reserve sectors for the allocation tables themselves
    ///
    /// # Arguments
    ///
    /// * `count` - Number of sectors to reserve
    /// * `marker` - `FATSECT` or `DIFSECT`, stored in each reserved entry
    ///
    /// # Returns
    ///
    /// The first reserved sector, or `ENDOFCHAIN` when `count` is zero
    pub fn allocate_special(&mut self, count: u32, marker: u32) -> u32 {
        if count == 0 {
            return ENDOFCHAIN;
        }

        let start = self.next_sector;
        let end = start + count;
        self.fat.resize(end as usize, marker);
        self.next_sector = end;
        start
    }

    /// Number of sectors allocated so far
    pub fn total_sectors(&self) -> u32 {
        self.next_sector
    }

    #[cfg(test)]
    pub fn fat(&self) -> &[u32] {
        &self.fat
    }

    /// The FAT cut into sectors
    ///
    /// # Returns
    ///
    /// One buffer per FAT sector, the last padded with `FREESECT`
    pub fn generate_fat_sectors(&self) -> Vec<Vec<u8>> {
        table_sectors(&self.fat, self.sector_size)
    }

    /// Check every chain terminates inside the table
    ///
    /// # Returns
    ///
    /// A description of the first link that points past the table or back
    /// to an earlier sector
    pub fn validate(&self) -> Result<(), String> {
        let len = self.fat.len() as u32;
        for (sector, &next) in self.fat.iter().enumerate() {
            match next {
                ENDOFCHAIN | FREESECT | FATSECT | DIFSECT => {},
                n if n >= len => {
                    return Err(format!("Invalid next sector {} at sector {}", n, sector));
                },
                n if n <= sector as u32 => {
                    return Err(format!("Backward link {} at sector {}", n, sector));
                },
                _ => {},
            }
        }
        Ok(())
    }
}

/// Split an allocation table into sectors, filling the last with FREESECT
pub(super) fn table_sectors(entries: &[u32], sector_size: usize) -> Vec<Vec<u8>> {
    entries
        .chunks(sector_size / 4)
        .map(|chunk| {
            let mut sector: Vec<u8> = chunk.iter().flat_map(|e| e.to_le_bytes()).collect();
            sector.resize(sector_size, 0xFF);
            sector
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_chain() {
        let mut fat = FatBuilder::new(512);
        let start = fat.allocate_chain(1024);
        assert_eq!(start, 0);
        assert_eq!(fat.total_sectors(), 2);
        assert_eq!(fat.fat()[0], 1);
        assert_eq!(fat.fat()[1], ENDOFCHAIN);
    }

    #[test]
    fn test_empty_chain() {
        let mut fat = FatBuilder::new(512);
        assert_eq!(fat.allocate_chain(0), ENDOFCHAIN);
        assert_eq!(fat.total_sectors(), 0);
    }

    #[test]
    fn test_allocate_special() {
        let mut fat = FatBuilder::new(512);
        fat.allocate_chain(512);
        let start = fat.allocate_special(2, FATSECT);
        assert_eq!(start, 1);
        assert_eq!(fat.fat()[1], FATSECT);
        assert_eq!(fat.fat()[2], FATSECT);
        assert!(fat.validate().is_ok());
    }

    #[test]
    fn test_generate_pads_with_freesect() {
        let mut fat = FatBuilder::new(512);
        fat.allocate_chain(100);
        let sectors = fat.generate_fat_sectors();
        assert_eq!(sectors.len(), 1);
        assert_eq!(&sectors[0][0..4], &ENDOFCHAIN.to_le_bytes());
        assert_eq!(&sectors[0][4..8], &FREESECT.to_le_bytes());
    }
}
