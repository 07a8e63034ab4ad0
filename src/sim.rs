// SPDX-License-Identifier: MIT

//! Software models of the CRACEN noise generator and CryptoMaster.
//!
//! Both models implement the [`hal`](crate::hal) traits and record
//! every module enable/disable, reset and job start in a trace, so
//! tests can check the drivers' hardware discipline. Faults can be
//! injected into either model.
//!
//! [`SimRng`] does not model the conditioning function: FIFO words are
//! the raw noise words. [`SimCryptoMaster`] walks the descriptor chain
//! it is given and runs the AES transform with the `aes` crate.
use crate::{
    ecb::{Block, BLOCK_LEN},
    hal::{
        aes_engine, dma, CmInterrupt, CmStatus, CryptoMaster, DmaDescriptor, IndirectMode,
        ModuleControl, Modules, RngControl, RngPeripheral, RngState,
    },
    trng::CONDITIONING_KEY_WORDS,
};
use aes::{
    cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit},
    Aes128Enc, Aes192Enc, Aes256Enc,
};
use log::trace;
use std::{collections::VecDeque, vec::Vec};

/// Hardware interaction recorded by the simulators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    ModuleEnable(Modules),
    ModuleDisable(Modules),
    RngSoftReset,
    ConditioningKeySet(usize),
    CmStart,
    CmSoftReset,
}

/// Where [`SimRng`] draws its noise words from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Noise {
    /// The host operating system, via `getrandom`.
    Os,
    /// A counter starting at the given value. Deterministic, for tests.
    Counter(u32),
}

/// Software model of the noise generator.
///
/// The FSM advances one step per status read while the module and
/// the generator are both enabled: `RESET` to `STARTUP`, then after
/// a number of polls to `READY` (or `ERROR` when a startup failure is
/// pending). In `READY` each FIFO level read adds one word until the
/// FIFO is full.
#[derive(Debug)]
pub struct SimRng {
    noise: Noise,
    state: RngState,
    control: RngControl,
    enabled: Modules,
    off_timer: u32,
    clk_div: u32,
    init_wait: u32,
    key: [u32; CONDITIONING_KEY_WORDS],
    fifo: VecDeque<u32>,
    fifo_depth: usize,
    startup_polls: u32,
    polls: u32,
    startup_failures: u32,
    health_failure_after: Option<u32>,
    trace: Vec<Event>,
}

/// FIFO depth in words of the modelled noise generator.
pub const SIM_FIFO_DEPTH: usize = 16;

impl Default for SimRng {
    fn default() -> Self {
        Self::new()
    }
}

impl SimRng {
    pub fn new() -> Self {
        Self {
            noise: Noise::Os,
            state: RngState::Reset,
            control: RngControl::default(),
            enabled: Modules::empty(),
            off_timer: 0,
            clk_div: 0,
            init_wait: 0,
            key: [0; CONDITIONING_KEY_WORDS],
            fifo: VecDeque::with_capacity(SIM_FIFO_DEPTH),
            fifo_depth: SIM_FIFO_DEPTH,
            startup_polls: 3,
            polls: 0,
            startup_failures: 0,
            health_failure_after: None,
            trace: Vec::new(),
        }
    }

    pub fn with_noise(mut self, noise: Noise) -> Self {
        self.noise = noise;
        self
    }

    /// Number of status reads spent in `STARTUP`.
    pub fn with_startup_polls(mut self, polls: u32) -> Self {
        self.startup_polls = polls;
        self
    }

    /// Make the next `count` startups end in `ERROR` instead of `READY`.
    pub fn fail_startup(&mut self, count: u32) {
        self.startup_failures = count;
    }

    /// Force the FSM into `ERROR`, as a failing health test would.
    pub fn raise_health_error(&mut self) {
        self.state = RngState::Error;
    }

    /// Raise a health error once `words` more FIFO words were read.
    pub fn fail_health_after(&mut self, words: u32) {
        self.health_failure_after = Some(words);
    }

    pub fn trace(&self) -> &[Event] {
        &self.trace
    }

    pub fn clear_trace(&mut self) {
        self.trace.clear();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.contains(Modules::RNG)
    }

    pub fn control(&self) -> RngControl {
        self.control
    }

    pub fn off_timer(&self) -> u32 {
        self.off_timer
    }

    pub fn clk_div(&self) -> u32 {
        self.clk_div
    }

    pub fn init_wait(&self) -> u32 {
        self.init_wait
    }

    fn running(&self) -> bool {
        self.is_enabled() && self.control.enable
    }

    fn next_noise(&mut self) -> u32 {
        match &mut self.noise {
            Noise::Os => {
                let mut word = [0u8; 4];
                // a failing OS source reads as a stuck-at-zero generator
                if getrandom::getrandom(&mut word).is_err() {
                    return 0;
                }
                u32::from_le_bytes(word)
            }
            Noise::Counter(next) => {
                let word = *next;
                *next = next.wrapping_add(1);
                word
            }
        }
    }

    fn tick(&mut self) {
        if !self.running() {
            return;
        }
        match self.state {
            RngState::Reset => {
                self.state = RngState::Startup;
                self.polls = 0;
            }
            RngState::Startup => {
                self.polls += 1;
                if self.polls >= self.startup_polls {
                    if self.startup_failures > 0 {
                        self.startup_failures -= 1;
                        self.state = RngState::Error;
                    } else {
                        self.state = RngState::Ready;
                    }
                }
            }
            RngState::Ready => {
                if self.fifo.len() < self.fifo_depth {
                    let word = self.next_noise();
                    self.fifo.push_back(word);
                }
            }
            RngState::Error => {}
        }
    }
}

impl ModuleControl for SimRng {
    fn module_enable(&mut self, modules: Modules) {
        self.enabled |= modules;
        self.trace.push(Event::ModuleEnable(modules));
    }

    fn module_disable(&mut self, modules: Modules) {
        self.enabled &= !modules;
        self.trace.push(Event::ModuleDisable(modules));
    }
}

impl RngPeripheral for SimRng {
    fn set_control(&mut self, control: &RngControl) {
        if control.soft_reset {
            self.state = RngState::Reset;
            self.fifo.clear();
            self.key = [0; CONDITIONING_KEY_WORDS];
            self.trace.push(Event::RngSoftReset);
        }
        self.control = *control;
    }

    fn set_off_timer(&mut self, value: u32) {
        self.off_timer = value;
    }

    fn set_clk_div(&mut self, value: u32) {
        self.clk_div = value;
    }

    fn set_init_wait(&mut self, value: u32) {
        self.init_wait = value;
    }

    fn fsm_state(&mut self) -> RngState {
        self.tick();
        self.state
    }

    fn fifo_level(&mut self) -> u32 {
        self.tick();
        self.fifo.len() as u32
    }

    fn fifo_read(&mut self) -> u32 {
        if let Some(left) = self.health_failure_after {
            let left = left.saturating_sub(1);
            self.health_failure_after = Some(left);
            if left == 0 {
                self.health_failure_after = None;
                self.raise_health_error();
            }
        }
        // reading an empty FIFO returns zero on hardware
        self.fifo.pop_front().unwrap_or(0)
    }

    fn conditioning_key(&mut self, index: usize) -> u32 {
        self.key[index]
    }

    fn set_conditioning_key(&mut self, index: usize, value: u32) {
        self.key[index] = value;
        self.trace.push(Event::ConditioningKeySet(index));
    }
}

/// Software model of the CryptoMaster running AES-ECB jobs.
///
/// The job runs to completion when started; the model then reports
/// busy for a configurable number of status reads. Address registers
/// hold plain addresses, as the hardware registers do.
#[derive(Debug)]
pub struct SimCryptoMaster {
    enabled: Modules,
    fetch_addr: usize,
    push_addr: usize,
    indirect: IndirectMode,
    pending: CmInterrupt,
    busy_polls: u32,
    busy: u32,
    jobs: usize,
    fault: Option<(usize, CmInterrupt)>,
    trace: Vec<Event>,
}

impl Default for SimCryptoMaster {
    fn default() -> Self {
        Self::new()
    }
}

impl SimCryptoMaster {
    pub fn new() -> Self {
        Self {
            enabled: Modules::empty(),
            fetch_addr: 0,
            push_addr: 0,
            indirect: IndirectMode::empty(),
            pending: CmInterrupt::empty(),
            busy_polls: 2,
            busy: 0,
            jobs: 0,
            fault: None,
            trace: Vec::new(),
        }
    }

    /// Number of status reads that report busy after a start.
    pub fn with_busy_polls(mut self, polls: u32) -> Self {
        self.busy_polls = polls;
        self
    }

    /// Fail the `job`-th job (1-based, counted from now) with `error`.
    pub fn fail_job(&mut self, job: usize, error: CmInterrupt) {
        self.fault = Some((self.jobs + job, error));
    }

    /// Jobs started so far.
    pub fn jobs(&self) -> usize {
        self.jobs
    }

    pub fn trace(&self) -> &[Event] {
        &self.trace
    }

    pub fn clear_trace(&mut self) {
        self.trace.clear();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.contains(Modules::CRYPTOMASTER)
    }

    /// Run the job in the programmed descriptor chains.
    ///
    /// # Safety
    ///
    /// Same contract as [`CryptoMaster::start`].
    unsafe fn execute(&mut self) -> Result<(), CmInterrupt> {
        let mut config = None;
        let mut key: &[u8] = &[];
        let mut input: &[u8] = &[];

        let mut desc = self.fetch_addr as *const DmaDescriptor;
        loop {
            if desc.is_null() || desc == dma::DESC_STOP as *const DmaDescriptor {
                return Err(CmInterrupt::FETCH_ERROR);
            }
            let d = &*desc;
            let len = (d.length & dma::LENGTH_MASK) as usize;
            if d.addr.is_null() {
                return Err(CmInterrupt::FETCH_ERROR);
            }
            let data = core::slice::from_raw_parts(d.addr as *const u8, len);

            if d.tag & dma::TAG_CONFIG != 0 {
                match dma::tag_offset(d.tag) {
                    aes_engine::REG_OFFSET_CONFIG if len == 4 => {
                        config = Some(u32::from_ne_bytes([data[0], data[1], data[2], data[3]]));
                    }
                    aes_engine::REG_OFFSET_KEY => key = data,
                    _ => return Err(CmInterrupt::FETCH_ERROR),
                }
            } else if d.tag & dma::TAG_ENGINE_MASK == dma::TAG_ENGINE_AES {
                input = data;
            }

            if d.tag & dma::TAG_LAST != 0 {
                break;
            }
            desc = d.next;
        }

        let config = config.ok_or(CmInterrupt::FETCH_ERROR)?;
        if aes_engine::mode(config) != aes_engine::MODE_ECB || aes_engine::is_decrypt(config) {
            return Err(CmInterrupt::FETCH_ERROR);
        }
        let input: &Block = input.try_into().map_err(|_| CmInterrupt::FETCH_ERROR)?;
        let output = soft_ecb(key, input).ok_or(CmInterrupt::FETCH_ERROR)?;

        let push = self.push_addr as *const DmaDescriptor;
        if push.is_null() || push == dma::DESC_STOP as *const DmaDescriptor {
            return Err(CmInterrupt::PUSH_ERROR);
        }
        let p = &*push;
        if (p.length & dma::LENGTH_MASK) as usize != BLOCK_LEN || p.addr.is_null() {
            return Err(CmInterrupt::PUSH_ERROR);
        }
        core::ptr::copy_nonoverlapping(output.as_ptr(), p.addr, BLOCK_LEN);
        Ok(())
    }
}

/// AES-ECB of one block with a 128, 192 or 256-bit key.
fn soft_ecb(key: &[u8], input: &Block) -> Option<Block> {
    let mut block = GenericArray::clone_from_slice(input);
    match key.len() {
        16 => Aes128Enc::new_from_slice(key).ok()?.encrypt_block(&mut block),
        24 => Aes192Enc::new_from_slice(key).ok()?.encrypt_block(&mut block),
        32 => Aes256Enc::new_from_slice(key).ok()?.encrypt_block(&mut block),
        _ => return None,
    }
    let mut output = [0u8; BLOCK_LEN];
    output.copy_from_slice(&block);
    Some(output)
}

impl ModuleControl for SimCryptoMaster {
    fn module_enable(&mut self, modules: Modules) {
        self.enabled |= modules;
        self.trace.push(Event::ModuleEnable(modules));
    }

    fn module_disable(&mut self, modules: Modules) {
        self.enabled &= !modules;
        self.trace.push(Event::ModuleDisable(modules));
    }
}

impl CryptoMaster for SimCryptoMaster {
    fn set_fetch_addr(&mut self, desc: *const DmaDescriptor) {
        self.fetch_addr = desc as usize;
    }

    fn set_push_addr(&mut self, desc: *const DmaDescriptor) {
        self.push_addr = desc as usize;
    }

    fn set_indirect(&mut self, mode: IndirectMode) {
        self.indirect = mode;
    }

    unsafe fn start(&mut self) {
        self.jobs += 1;
        self.trace.push(Event::CmStart);
        self.busy = self.busy_polls;

        if let Some((job, error)) = self.fault {
            if job == self.jobs {
                trace!("sim: injecting {:?} into job {}", error, job);
                self.fault = None;
                self.pending |= error;
                return;
            }
        }
        if !self.is_enabled() || !self.indirect.contains(IndirectMode::FETCH | IndirectMode::PUSH) {
            self.pending |= CmInterrupt::FETCH_ERROR;
            return;
        }
        match self.execute() {
            Ok(()) => self.pending |= CmInterrupt::FETCH_STOPPED | CmInterrupt::PUSH_STOPPED,
            Err(error) => self.pending |= error,
        }
    }

    fn int_pending(&mut self) -> CmInterrupt {
        self.pending
    }

    fn status(&mut self) -> CmStatus {
        if self.busy > 0 {
            self.busy -= 1;
            CmStatus::BUSY_FETCH | CmStatus::BUSY_PUSH
        } else {
            CmStatus::empty()
        }
    }

    fn soft_reset(&mut self) {
        self.fetch_addr = 0;
        self.push_addr = 0;
        self.indirect = IndirectMode::empty();
        self.pending = CmInterrupt::empty();
        self.busy = 0;
        self.trace.push(Event::CmSoftReset);
    }
}
