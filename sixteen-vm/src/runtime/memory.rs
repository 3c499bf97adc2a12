//! Address space of the machine.
//!
//! Everything the CPU reads or writes goes through a [`MemoryMapper`], which forwards
//! each access to the one [`Device`] whose region contains the address. Words are
//! big-endian: the byte at `a` is the most significant.

use sixteen_asm::assembler::ADDRESS_SPACE;

use crate::runtime::errors::MemoryError;

/// Anything that can be placed in the address space.
pub trait Device: Send {
    fn get8(&self, address: u16) -> Result<u8, MemoryError>;

    fn set8(&mut self, address: u16, value: u8) -> Result<(), MemoryError>;

    fn get16(&self, address: u16) -> Result<u16, MemoryError> {
        let high = self.get8(address)?;
        let low = self.get8(address.wrapping_add(1))?;
        Ok(u16::from_be_bytes([high, low]))
    }

    fn set16(&mut self, address: u16, value: u16) -> Result<(), MemoryError> {
        let [high, low] = value.to_be_bytes();
        self.set8(address, high)?;
        self.set8(address.wrapping_add(1), low)
    }
}

/// Plain byte storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn out_of_bounds(&self, address: u16) -> MemoryError {
        MemoryError::OutOfBounds {
            address,
            size: self.bytes.len(),
        }
    }
}

impl Device for Memory {
    fn get8(&self, address: u16) -> Result<u8, MemoryError> {
        self.bytes
            .get(address as usize)
            .copied()
            .ok_or_else(|| self.out_of_bounds(address))
    }

    fn set8(&mut self, address: u16, value: u8) -> Result<(), MemoryError> {
        let size = self.bytes.len();
        let byte = self
            .bytes
            .get_mut(address as usize)
            .ok_or(MemoryError::OutOfBounds { address, size })?;
        *byte = value;
        Ok(())
    }
}

struct Region {
    device: Box<dyn Device>,
    start: u16,
    end: u16, // inclusive
    remap: bool,
}

impl Region {
    fn contains(&self, address: u16) -> bool {
        (self.start..=self.end).contains(&address)
    }

    /// With `remap` the device sees offsets from the start of its region.
    fn local(&self, address: u16) -> u16 {
        if self.remap {
            address - self.start
        } else {
            address
        }
    }
}

#[derive(Default)]
pub struct MemoryMapper {
    regions: Vec<Region>,
}

impl std::fmt::Debug for MemoryMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut list = f.debug_list();
        for r in &self.regions {
            list.entry(&format_args!("{:04X}-{:04X}", r.start, r.end));
        }
        list.finish()
    }
}

impl MemoryMapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places `device` over `start..=end`. Regions may not overlap.
    pub fn map<D>(&mut self, device: D, start: u16, end: u16, remap: bool) -> Result<(), MemoryError>
    where
        D: Device + 'static,
    {
        if end < start {
            return Err(MemoryError::InvalidRange { start, end });
        }
        if self
            .regions
            .iter()
            .any(|r| start <= r.end && r.start <= end)
        {
            return Err(MemoryError::Overlap { start, end });
        }

        self.regions.push(Region {
            device: Box::new(device),
            start,
            end,
            remap,
        });
        Ok(())
    }

    /// Mapped ranges, in registration order.
    pub fn regions(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.regions.iter().map(|r| (r.start, r.end))
    }

    fn find(&self, address: u16) -> Result<&Region, MemoryError> {
        self.regions
            .iter()
            .find(|r| r.contains(address))
            .ok_or(MemoryError::Unmapped(address))
    }

    fn find_mut(&mut self, address: u16) -> Result<&mut Region, MemoryError> {
        self.regions
            .iter_mut()
            .find(|r| r.contains(address))
            .ok_or(MemoryError::Unmapped(address))
    }

    pub fn get8(&self, address: u16) -> Result<u8, MemoryError> {
        let region = self.find(address)?;
        region.device.get8(region.local(address))
    }

    pub fn get16(&self, address: u16) -> Result<u16, MemoryError> {
        let region = self.find(address)?;
        region.device.get16(region.local(address))
    }

    pub fn set8(&mut self, address: u16, value: u8) -> Result<(), MemoryError> {
        let region = self.find_mut(address)?;
        let local = region.local(address);
        region.device.set8(local, value)
    }

    pub fn set16(&mut self, address: u16, value: u16) -> Result<(), MemoryError> {
        let region = self.find_mut(address)?;
        let local = region.local(address);
        region.device.set16(local, value)
    }

    /// Copies `bytes` into the address space starting at `address`.
    /// Nothing is written if the bytes would run past the end of the address space.
    pub fn load(&mut self, address: u16, bytes: &[u8]) -> Result<(), MemoryError> {
        if address as usize + bytes.len() > ADDRESS_SPACE {
            return Err(MemoryError::LoadOverflow {
                address,
                len: bytes.len(),
            });
        }

        for (target, byte) in (address..=u16::MAX).zip(bytes) {
            self.set8(target, *byte)?;
        }
        Ok(())
    }

    /// Reads `len` bytes starting at `address`, stopping early at unmapped memory.
    pub fn read(&self, address: u16, len: usize) -> Vec<u8> {
        (0..len)
            .map_while(|i| self.get8(address.wrapping_add(i as u16)).ok())
            .collect()
    }
}
