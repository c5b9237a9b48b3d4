//! The 16 MiB memory bus and its page-indexed MMIO dispatch table.
//!
//! RAM is backed by `Box<[AtomicU8]>` so that [`Bus::get_memory`] hands
//! devices a genuinely lock-free, non-coherent byte-slice view (torn reads
//! are tolerated, per the concurrency model) while `read32`/`write32`/
//! `reset()` are serialised against each other by a single coordinating
//! mutex. No `unsafe` is needed for either property.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::regs::{ADDRESS_SPACE_SIZE, PAGE_COUNT, PAGE_SHIFT};

/// A read handler. Takes the full 32-bit address (not offset into the
/// region) and returns the 32-bit value a `read32` at that address should
/// observe.
pub type ReadHandler = Arc<dyn Fn(u32) -> u32 + Send + Sync>;
/// A write handler. Takes the full 32-bit address and the value written.
pub type WriteHandler = Arc<dyn Fn(u32, u32) + Send + Sync>;

/// A registered MMIO range. `start`/`end` are inclusive byte addresses.
/// Cheap to duplicate across every page a wide region spans, since the
/// handlers are reference-counted.
#[derive(Clone)]
pub struct IoRegion {
    pub start: u32,
    pub end: u32,
    pub on_read: Option<ReadHandler>,
    pub on_write: Option<WriteHandler>,
}

impl IoRegion {
    fn contains(&self, addr: u32) -> bool {
        addr >= self.start && addr <= self.end
    }
}

fn page_index(addr: u32) -> usize {
    ((addr & 0x000F_FF00) >> PAGE_SHIFT) as usize
}

/// The fantasy machine's single flat 16 MiB address space.
pub struct Bus {
    ram: Box<[AtomicU8]>,
    /// Page-indexed table of registered regions. Populated only during
    /// device construction (see the Lifecycles note: regions are never
    /// removed), then read concurrently for the life of the bus.
    pages: Vec<RwLock<Vec<IoRegion>>>,
    /// Serialises the dispatch+store sequence of `read32`/`write32`/
    /// `reset()` against each other. Never taken by `get_memory()`.
    dispatch_lock: Mutex<()>,
}

impl Bus {
    pub fn new() -> Self {
        let ram = (0..ADDRESS_SPACE_SIZE)
            .map(|_| AtomicU8::new(0))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let mut pages = Vec::with_capacity(PAGE_COUNT);
        pages.resize_with(PAGE_COUNT, || RwLock::new(Vec::new()));
        Bus {
            ram,
            pages,
            dispatch_lock: Mutex::new(()),
        }
    }

    /// Registers an MMIO region. Appended to every 256-byte page slot the
    /// range touches; may be called multiple times with overlapping
    /// ranges, in which case the first-registered region whose range
    /// matches an address wins (first region whose range matches wins).
    pub fn map_io(
        &self,
        start: u32,
        end: u32,
        on_read: Option<ReadHandler>,
        on_write: Option<WriteHandler>,
    ) {
        let region = IoRegion {
            start,
            end,
            on_read,
            on_write,
        };
        let first_page = page_index(start);
        let last_page = page_index(end);
        // Handlers are `Arc`-backed, so a region spanning multiple pages
        // is registered once per page slot at negligible cost; the real
        // bounds check in `IoRegion::contains` means aliasing a wide
        // region across extra page buckets can never misroute a read.
        for page in first_page..=last_page {
            self.pages[page].write().unwrap().push(region.clone());
        }
    }

    fn with_region<R>(&self, addr: u32, f: impl FnOnce(Option<&IoRegion>) -> R) -> R {
        let slot = self.pages[page_index(addr)].read().unwrap();
        let region = slot.iter().find(|r| r.contains(addr));
        f(region)
    }

    /// Reads four little-endian bytes starting at `addr`, raw (no MMIO
    /// dispatch, no locking). Used internally after a region handler has
    /// already latched its value into the byte array.
    fn raw_read32(&self, addr: u32) -> u32 {
        let idx = addr as usize;
        let b0 = self.ram[idx % ADDRESS_SPACE_SIZE].load(Ordering::Relaxed);
        let b1 = self.ram[(idx.wrapping_add(1)) % ADDRESS_SPACE_SIZE].load(Ordering::Relaxed);
        let b2 = self.ram[(idx.wrapping_add(2)) % ADDRESS_SPACE_SIZE].load(Ordering::Relaxed);
        let b3 = self.ram[(idx.wrapping_add(3)) % ADDRESS_SPACE_SIZE].load(Ordering::Relaxed);
        u32::from_le_bytes([b0, b1, b2, b3])
    }

    fn raw_write32(&self, addr: u32, value: u32) {
        let idx = addr as usize;
        for (i, byte) in value.to_le_bytes().into_iter().enumerate() {
            self.ram[(idx.wrapping_add(i)) % ADDRESS_SPACE_SIZE].store(byte, Ordering::Relaxed);
        }
    }

    /// Reads a 32-bit little-endian value, dispatching to a region's
    /// `on_read` handler if one matches `addr`. An out-of-range address
    /// silently wraps within the 16 MiB space; there is no failure path.
    pub fn read32(&self, addr: u32) -> u32 {
        let _guard = self.dispatch_lock.lock().unwrap();
        let handled = self.with_region(addr, |region| {
            region.and_then(|r| r.on_read.as_ref()).map(|h| h(addr))
        });
        match handled {
            Some(value) => {
                self.raw_write32(addr, value);
                value
            }
            None => self.raw_read32(addr),
        }
    }

    /// Writes a 32-bit little-endian value, dispatching to a region's
    /// `on_write` handler if one matches `addr`, then always latching the
    /// value into the byte array so subsequent raw reads stay consistent.
    pub fn write32(&self, addr: u32, value: u32) {
        let _guard = self.dispatch_lock.lock().unwrap();
        self.with_region(addr, |region| {
            if let Some(h) = region.and_then(|r| r.on_write.as_ref()) {
                h(addr, value);
            }
        });
        self.raw_write32(addr, value);
    }

    /// Lock-free, non-coherent byte-slice view of the full address space.
    /// Devices may read through this to parse large blobs without a
    /// per-word round trip; torn reads relative to a concurrent `write32`
    /// are tolerated (see the concurrency model).
    pub fn get_memory(&self) -> &[AtomicU8] {
        &self.ram
    }

    /// Copies `len` bytes starting at `addr` out of RAM, tolerating torn
    /// reads from concurrent writers. Used by player parser tasks.
    pub fn copy_out(&self, addr: u32, len: usize) -> Vec<u8> {
        let mem = self.get_memory();
        (0..len)
            .map(|i| {
                let idx = (addr as usize).wrapping_add(i) % ADDRESS_SPACE_SIZE;
                mem[idx].load(Ordering::Relaxed)
            })
            .collect()
    }

    /// Copies `data` into RAM starting at `addr`, lock-free. Used by the
    /// frontend to load a guest binary before the guest CPU starts.
    pub fn load_bytes(&self, addr: u32, data: &[u8]) {
        let mem = self.get_memory();
        for (i, byte) in data.iter().enumerate() {
            let idx = (addr as usize).wrapping_add(i) % ADDRESS_SPACE_SIZE;
            mem[idx].store(*byte, Ordering::Relaxed);
        }
    }

    /// Zeros all of RAM. Registered regions are untouched (they are never
    /// removed); each device resets its own latched state independently.
    pub fn reset(&self) {
        let _guard = self.dispatch_lock.lock().unwrap();
        for byte in self.ram.iter() {
            byte.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    #[test]
    fn raw_read_write_round_trip() {
        let bus = Bus::new();
        bus.write32(0x1000, 0xDEAD_BEEF);
        assert_eq!(bus.read32(0x1000), 0xDEAD_BEEF);
    }

    #[test]
    fn mmio_region_routes_through_handler() {
        let bus = Bus::new();
        let seen: Arc<AtomicU32> = Arc::new(AtomicU32::new(0));
        let seen_w = seen.clone();
        bus.map_io(
            0xF000,
            0xF003,
            None,
            Some(Arc::new(move |_addr, value| {
                seen_w.store(value, Ordering::SeqCst);
            })),
        );
        bus.write32(0xF000, 0x1234_5678);
        assert_eq!(seen.load(Ordering::SeqCst), 0x1234_5678);
        // The handled value is also latched into RAM for raw reads.
        assert_eq!(bus.read32(0xF000), 0x1234_5678);
    }

    #[test]
    fn overlapping_regions_first_match_wins() {
        let bus = Bus::new();
        let hits: Arc<AtomicU32> = Arc::new(AtomicU32::new(0));
        let hits_a = hits.clone();
        bus.map_io(
            0xF100,
            0xF1FF,
            None,
            Some(Arc::new(move |_a, _v| {
                hits_a.store(1, Ordering::SeqCst);
            })),
        );
        bus.map_io(0xF150, 0xF1FF, None, Some(Arc::new(|_a, _v| {})));
        bus.write32(0xF150, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reset_zeros_ram() {
        let bus = Bus::new();
        bus.write32(0x2000, 0xFFFF_FFFF);
        bus.reset();
        assert_eq!(bus.read32(0x2000), 0);
    }

    #[test]
    fn unaligned_access_treated_as_four_successive_bytes() {
        let bus = Bus::new();
        bus.write32(0x10, 0x0102_0304);
        // Reading starting one byte in picks up the low 3 bytes of the
        // first write plus whatever follows.
        let shifted = bus.read32(0x11);
        assert_eq!(shifted & 0x00FF_FFFF, 0x0001_0203 & 0x00FF_FFFF);
    }
}
