// Licensed under the Apache-2.0 license

use crate::error::AesError;
use log::debug;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::ptr;

/// Physical base address of the AES config registers.
pub const AES_BASE_ADDR: u64 = 0x43C0_0000;
pub const CIPHER_CFG_REG_OFFSET: usize = 0;
pub const DECIPHER_CFG_REG_OFFSET: usize = 4;

/// Written to the config register to mark the next bytes of the input stream
/// as key material.
pub const KEY_LOAD_ASSERT: u32 = 0xFFFF_FFFF;
pub const KEY_LOAD_DEASSERT: u32 = 0x0000_0000;

/// The 32-bit config word of one AES core.
pub trait KeyLoadRegister: Send + Sync {
    fn write(&self, value: u32);
}

/// Holds key-load asserted for its lifetime.
pub struct KeyLoadGuard<'a> {
    register: &'a dyn KeyLoadRegister,
}

impl<'a> KeyLoadGuard<'a> {
    pub fn assert(register: &'a dyn KeyLoadRegister) -> Self {
        register.write(KEY_LOAD_ASSERT);
        Self { register }
    }
}

impl Drop for KeyLoadGuard<'_> {
    fn drop(&mut self) {
        self.register.write(KEY_LOAD_DEASSERT);
    }
}

/// Config register reached through a `/dev/mem` mapping.
pub struct MmioConfigRegister {
    mapping: *mut libc::c_void,
    map_len: usize,
    reg: *mut u32,
}

// SAFETY: the register is a single aligned 32-bit word written with volatile
// stores; the mapping is owned by this struct.
unsafe impl Send for MmioConfigRegister {}
unsafe impl Sync for MmioConfigRegister {}

impl MmioConfigRegister {
    pub fn map(base: u64, offset: usize) -> Result<Self, AesError> {
        let addr = base + offset as u64;
        let map_err = |source| AesError::Map { addr, source };

        let mem = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open("/dev/mem")
            .map_err(map_err)?;

        // SAFETY: sysconf has no preconditions.
        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as u64;
        let page_base = addr & !(page_size - 1);
        let page_offset = (addr - page_base) as usize;
        let map_len = page_offset + std::mem::size_of::<u32>();

        // SAFETY: mapping a fresh region; the result is checked against
        // MAP_FAILED before use.
        let mapping = unsafe {
            libc::mmap(
                ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                mem.as_raw_fd(),
                page_base as libc::off_t,
            )
        };
        if mapping == libc::MAP_FAILED {
            return Err(map_err(std::io::Error::last_os_error()));
        }
        debug!("Mapped AES config register at {:#x}", addr);

        Ok(Self {
            mapping,
            map_len,
            // SAFETY: page_offset lies within the mapping.
            reg: unsafe { (mapping as *mut u8).add(page_offset) as *mut u32 },
        })
    }
}

impl KeyLoadRegister for MmioConfigRegister {
    fn write(&self, value: u32) {
        // SAFETY: `reg` points into the live mapping.
        unsafe { self.reg.write_volatile(value) };
    }
}

impl Drop for MmioConfigRegister {
    fn drop(&mut self) {
        // SAFETY: unmapping the region mapped in `map`.
        unsafe {
            libc::munmap(self.mapping, self.map_len);
        }
    }
}
