// SPDX-License-Identifier: MIT

//! Register-level interface to the CRACEN peripheral.
//!
//! The drivers in [`trng`](crate::trng) and [`ecb`](crate::ecb) only
//! talk to hardware through the traits in this module. A board crate
//! implements them on top of its peripheral access crate; the
//! [`sim`](crate::sim) module implements them in software.
//!
//! Bit layouts below follow the CryptoMaster DMA and AES engine
//! register maps. They are only interpreted by the hardware (or the
//! simulator), never by the DRBG itself.
use bitflags::bitflags;
use core::ops::{Deref, DerefMut};

bitflags! {
    /// Sub-modules of the CRACEN `ENABLE` register.
    #[derive(Default)]
    pub struct Modules: u32 {
        const CRYPTOMASTER = 1 << 0;
        const RNG          = 1 << 1;
        const PKEIKG       = 1 << 2;
    }
}

bitflags! {
    /// CryptoMaster pending interrupt bits.
    #[derive(Default)]
    pub struct CmInterrupt: u32 {
        const FETCH_BLOCK_END = 1 << 0;
        const FETCH_STOPPED   = 1 << 1;
        const FETCH_ERROR     = 1 << 2;
        const PUSH_BLOCK_END  = 1 << 3;
        const PUSH_STOPPED    = 1 << 4;
        const PUSH_ERROR      = 1 << 5;
    }
}

bitflags! {
    /// CryptoMaster status bits.
    #[derive(Default)]
    pub struct CmStatus: u32 {
        const BUSY_FETCH   = 1 << 0;
        const BUSY_PUSH    = 1 << 1;
        const PUSH_WAITING = 1 << 2;
    }
}

bitflags! {
    /// Indirect (descriptor based) addressing for the fetch and push DMA.
    #[derive(Default)]
    pub struct IndirectMode: u32 {
        const FETCH = 1 << 0;
        const PUSH  = 1 << 1;
    }
}

/// One CryptoMaster DMA descriptor, laid out as the DMA engine reads it.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct DmaDescriptor {
    pub addr: *mut u8,
    pub next: *mut DmaDescriptor,
    pub length: u32,
    pub tag: u32,
}

impl DmaDescriptor {
    pub const fn new(addr: *mut u8, length: u32, tag: u32) -> Self {
        Self {
            addr,
            next: dma::DESC_STOP,
            length,
            tag,
        }
    }
}

/// DMA descriptor length flags and tags.
pub mod dma {
    use super::DmaDescriptor;

    /// `next` value terminating a descriptor chain.
    pub const DESC_STOP: *mut DmaDescriptor = 1 as *mut DmaDescriptor;

    pub const LENGTH_REALIGN: u32 = 1 << 29;
    pub const LENGTH_MASK: u32 = (1 << 28) - 1;

    pub const TAG_ENGINE_AES: u32 = 1;
    pub const TAG_ENGINE_MASK: u32 = 0xf;
    pub const TAG_CONFIG: u32 = 1 << 4;
    pub const TAG_LAST: u32 = 1 << 5;
    pub const TAG_DATATYPE_AES_PAYLOAD: u32 = 0;

    /// Tag for a descriptor writing AES engine register at `offset`.
    pub const fn tag_aes_config(offset: u32) -> u32 {
        TAG_ENGINE_AES | TAG_CONFIG | (offset << 8)
    }

    /// Register offset carried by a config tag.
    pub const fn tag_offset(tag: u32) -> u32 {
        (tag >> 8) & 0xff
    }
}

/// AES engine configuration word and register offsets.
pub mod aes_engine {
    pub const REG_OFFSET_CONFIG: u32 = 0x00;
    pub const REG_OFFSET_KEY: u32 = 0x08;

    pub const MODE_ECB: u32 = 1;
    pub const KEY_SW_PROGRAMMED: u32 = 0;

    const DECRYPT: u32 = 1 << 0;
    const CONTEXT_SAVE: u32 = 1 << 4;
    const CONTEXT_LOAD: u32 = 1 << 5;
    const MODE_SHIFT: u32 = 8;
    const KEY_SEL_SHIFT: u32 = 28;

    pub const fn config(mode: u32, key_sel: u32, decrypt: bool, save: bool, load: bool) -> u32 {
        let mut value = (mode << MODE_SHIFT) | (key_sel << KEY_SEL_SHIFT);
        if decrypt {
            value |= DECRYPT;
        }
        if save {
            value |= CONTEXT_SAVE;
        }
        if load {
            value |= CONTEXT_LOAD;
        }
        value
    }

    pub const fn mode(config: u32) -> u32 {
        (config >> MODE_SHIFT) & 0xff
    }

    pub const fn is_decrypt(config: u32) -> bool {
        config & DECRYPT != 0
    }
}

/// Noise generator FSM state as reported by the status register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RngState {
    Reset,
    Startup,
    Ready,
    Error,
}

/// Noise generator control register.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RngControl {
    pub enable: bool,
    pub soft_reset: bool,
    pub number_128_blocks: u8,
}

/// Access to the shared CRACEN `ENABLE` register.
pub trait ModuleControl {
    fn module_enable(&mut self, modules: Modules);
    fn module_disable(&mut self, modules: Modules);
}

/// Register operations of the noise generator (`RNGCONTROL`).
pub trait RngPeripheral: ModuleControl {
    fn set_control(&mut self, control: &RngControl);
    fn set_off_timer(&mut self, value: u32);
    fn set_clk_div(&mut self, value: u32);
    fn set_init_wait(&mut self, value: u32);
    fn fsm_state(&mut self) -> RngState;
    /// FIFO fill level in 32-bit words.
    fn fifo_level(&mut self) -> u32;
    fn fifo_read(&mut self) -> u32;
    fn conditioning_key(&mut self, index: usize) -> u32;
    fn set_conditioning_key(&mut self, index: usize, value: u32);
}

/// Register operations of the CryptoMaster DMA front-end.
pub trait CryptoMaster: ModuleControl {
    fn set_fetch_addr(&mut self, desc: *const DmaDescriptor);
    fn set_push_addr(&mut self, desc: *const DmaDescriptor);
    fn set_indirect(&mut self, mode: IndirectMode);

    /// Start the job described by the fetch and push descriptors.
    ///
    /// # Safety
    ///
    /// Every descriptor reachable from the programmed fetch and push
    /// addresses, and every buffer they point to, must stay valid and
    /// unmoved until [`status`](CryptoMaster::status) reports idle or
    /// an error is pending.
    unsafe fn start(&mut self);

    fn int_pending(&mut self) -> CmInterrupt;
    fn status(&mut self) -> CmStatus;
    fn soft_reset(&mut self);
}

/// Scoped module enable. The modules are disabled again when the
/// guard is dropped, on every exit path.
pub struct Enabled<'a, H>
where
    H: ModuleControl + ?Sized,
{
    hal: &'a mut H,
    modules: Modules,
}

impl<'a, H> Enabled<'a, H>
where
    H: ModuleControl + ?Sized,
{
    pub fn new(hal: &'a mut H, modules: Modules) -> Self {
        hal.module_enable(modules);
        Self { hal, modules }
    }
}

impl<H> Deref for Enabled<'_, H>
where
    H: ModuleControl + ?Sized,
{
    type Target = H;

    fn deref(&self) -> &H {
        self.hal
    }
}

impl<H> DerefMut for Enabled<'_, H>
where
    H: ModuleControl + ?Sized,
{
    fn deref_mut(&mut self) -> &mut H {
        self.hal
    }
}

impl<H> Drop for Enabled<'_, H>
where
    H: ModuleControl + ?Sized,
{
    fn drop(&mut self) {
        self.hal.module_disable(self.modules);
    }
}

/// What a driver does between two reads of a status register.
pub trait Poll {
    fn relax(&mut self);
}

/// Tight spin. Lowest latency; the default on bare metal.
#[derive(Debug, Default, Clone, Copy)]
pub struct Spin;

impl Poll for Spin {
    fn relax(&mut self) {
        core::hint::spin_loop();
    }
}

/// Give the rest of the time slice back to the scheduler.
#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
#[derive(Debug, Default, Clone, Copy)]
pub struct Yield;

#[cfg(feature = "std")]
impl Poll for Yield {
    fn relax(&mut self) {
        std::thread::yield_now();
    }
}

/// Sleep for a fixed period between polls.
#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
#[derive(Debug, Clone, Copy)]
pub struct Sleep(pub std::time::Duration);

#[cfg(feature = "std")]
impl Poll for Sleep {
    fn relax(&mut self) {
        std::thread::sleep(self.0);
    }
}

impl<P> Poll for &mut P
where
    P: Poll + ?Sized,
{
    fn relax(&mut self) {
        (**self).relax();
    }
}
