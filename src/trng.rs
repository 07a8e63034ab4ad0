// SPDX-License-Identifier: MIT

//! Entropy source backed by the CRACEN noise generator.
//!
//! The noise generator is restarted (soft reset plus fixed
//! configuration) the first time it is engaged and again whenever its
//! startup or health tests report an error. After every restart the
//! first four FIFO words are spent on programming the conditioning
//! key; only later words are handed to the caller.
//!
//! All hardware wait conditions are handled by polling, so
//! [`Trng::get_entropy`] blocks until the request is satisfied. There
//! is no timeout: a noise generator that never becomes ready blocks
//! the caller forever.
use crate::{
    entropy::Entropy,
    error::{Error, ErrorKind},
    hal::{Enabled, Modules, Poll, RngControl, RngPeripheral, RngState, Spin},
};
use log::{debug, trace, warn};

/// Number of FIFO words used for the conditioning key.
pub const CONDITIONING_KEY_WORDS: usize = 4;

/// Reset value of the FIFO wake-up threshold, in 128-bit blocks minus one.
pub const FIFO_THRESHOLD_RESET: usize = 3;

/// Largest request [`Trng::get_entropy`] accepts. Anything above the
/// FIFO wake-up level might never become available at once.
pub const MAX_ENTROPY_LEN: usize = (FIFO_THRESHOLD_RESET + 1) * 16;

/// Fixed noise generator parameters written on every restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrngConfig {
    pub clk_div: u32,
    pub off_timer: u32,
    pub init_wait: u32,
    pub blocks_per_cycle: u8,
}

impl Default for TrngConfig {
    fn default() -> Self {
        Self {
            clk_div: 0,
            off_timer: 0,
            init_wait: 512,
            blocks_per_cycle: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Done,
    Processing,
    ResetNeeded,
}

/// Per-restart driver state.
#[derive(Debug)]
struct Conditioning {
    config: TrngConfig,
    key_set: bool,
}

impl Conditioning {
    fn restart<H>(&mut self, rng: &mut H)
    where
        H: RngPeripheral + ?Sized,
    {
        self.key_set = false;

        rng.set_control(&RngControl {
            soft_reset: true,
            ..RngControl::default()
        });
        rng.set_off_timer(self.config.off_timer);
        rng.set_clk_div(self.config.clk_div);
        rng.set_init_wait(self.config.init_wait);
        rng.set_control(&RngControl {
            enable: true,
            soft_reset: false,
            number_128_blocks: self.config.blocks_per_cycle,
        });
    }

    fn program_key<H>(&mut self, rng: &mut H) -> Step
    where
        H: RngPeripheral + ?Sized,
    {
        if (rng.fifo_level() as usize) < CONDITIONING_KEY_WORDS {
            return Step::Processing;
        }
        for i in 0..CONDITIONING_KEY_WORDS {
            let word = rng.fifo_read();
            rng.set_conditioning_key(i, word);
        }
        self.key_set = true;
        debug!("trng: conditioning key programmed");
        Step::Done
    }

    fn try_fill<H>(&mut self, rng: &mut H, bytes: &mut [u8]) -> Step
    where
        H: RngPeripheral + ?Sized,
    {
        match rng.fsm_state() {
            RngState::Error => return Step::ResetNeeded,
            RngState::Reset | RngState::Startup => return Step::Processing,
            RngState::Ready => {}
        }

        if !self.key_set && self.program_key(rng) != Step::Done {
            return Step::Processing;
        }

        let words = bytes.len().div_ceil(4);
        if (rng.fifo_level() as usize) < words {
            return Step::Processing;
        }

        for chunk in bytes.chunks_mut(4) {
            let word = rng.fifo_read().to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
        Step::Done
    }
}

/// Driver for the CRACEN noise generator.
///
/// # Example
///
/// ```
/// use cracen_drbg::{sim::SimRng, trng::Trng};
///
/// # use cracen_drbg::error::Error;
/// # fn main() -> Result<(), Error> {
/// let mut trng = Trng::new(SimRng::new());
/// let mut seed = [0u8; 48];
/// trng.get_entropy(&mut seed)?;
/// assert!(!trng.hal().is_enabled());
/// # Ok(())
/// # }
/// ```
pub struct Trng<H, P = Spin> {
    hal: H,
    poll: P,
    state: Conditioning,
}

impl<H> Trng<H>
where
    H: RngPeripheral,
{
    pub fn new(hal: H) -> Self {
        Self::with_config(hal, TrngConfig::default(), Spin)
    }
}

impl<H, P> Trng<H, P>
where
    H: RngPeripheral,
    P: Poll,
{
    pub fn with_config(hal: H, config: TrngConfig, poll: P) -> Self {
        Self {
            hal,
            poll,
            state: Conditioning {
                config,
                key_set: false,
            },
        }
    }

    pub fn config(&self) -> &TrngConfig {
        &self.state.config
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn hal_mut(&mut self) -> &mut H {
        &mut self.hal
    }

    pub fn into_inner(self) -> H {
        self.hal
    }

    /// Fill `bytes` with conditioned entropy, blocking until the
    /// noise generator can supply all of it.
    ///
    /// Bytes are taken least significant first from each FIFO word.
    /// The RNG module is enabled for the duration of the call only.
    ///
    /// # Error
    ///
    /// Returns [`ErrorKind::EntropyTooLarge`] without touching the
    /// hardware if `bytes` is longer than [`MAX_ENTROPY_LEN`].
    /// Hardware faults are recovered from by restarting the noise
    /// generator and are never reported.
    pub fn get_entropy(&mut self, bytes: &mut [u8]) -> Result<(), Error> {
        if bytes.len() > MAX_ENTROPY_LEN {
            return Err(ErrorKind::EntropyTooLarge.into());
        }

        let mut rng = Enabled::new(&mut self.hal, Modules::RNG);
        let mut step = Step::ResetNeeded;
        let mut restarts = 0u32;
        loop {
            if step == Step::ResetNeeded {
                if restarts > 0 {
                    warn!("trng: self-test failure, restarting noise generator");
                }
                self.state.restart(&mut *rng);
                restarts += 1;
            }
            step = self.state.try_fill(&mut *rng, bytes);
            if step == Step::Done {
                break;
            }
            self.poll.relax();
        }
        trace!("trng: {} bytes after {} restart(s)", bytes.len(), restarts);
        Ok(())
    }
}

impl<H, P> Entropy for Trng<H, P>
where
    H: RngPeripheral,
    P: Poll,
{
    fn fill_bytes(&mut self, bytes: &mut [u8]) -> Result<(), Error> {
        self.get_entropy(bytes)
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::{
        hal::{Modules, Sleep, Yield},
        sim::{Event, Noise, SimRng},
    };
    use alloc::vec::Vec;
    use std::time::Duration;

    fn counting_trng() -> Trng<SimRng> {
        Trng::new(SimRng::new().with_noise(Noise::Counter(0)))
    }

    #[test]
    fn first_words_become_conditioning_key() -> Result<(), Error> {
        let mut trng = counting_trng();
        let mut bytes = [0u8; 8];
        trng.get_entropy(&mut bytes)?;

        let rng = trng.hal_mut();
        let key: Vec<u32> = (0..CONDITIONING_KEY_WORDS)
            .map(|i| rng.conditioning_key(i))
            .collect();
        assert_eq!(key, [0, 1, 2, 3]);
        assert_eq!(bytes, [4, 0, 0, 0, 5, 0, 0, 0]);
        Ok(())
    }

    #[test]
    fn bytes_are_little_endian_per_word() -> Result<(), Error> {
        let mut trng = Trng::new(SimRng::new().with_noise(Noise::Counter(0x0403_0201)));
        let mut bytes = [0u8; 6];
        trng.get_entropy(&mut bytes)?;
        // words 0x04030201..=0x04030204 form the key
        assert_eq!(bytes, [0x05, 0x02, 0x03, 0x04, 0x06, 0x02]);
        Ok(())
    }

    fn count(trng: &Trng<SimRng>, event: Event) -> usize {
        trng.hal().trace().iter().filter(|e| **e == event).count()
    }

    #[test]
    fn every_call_programs_a_fresh_key() -> Result<(), Error> {
        let mut trng = counting_trng();
        let mut first = [0u8; 5];
        trng.get_entropy(&mut first)?;
        // a partial word still consumes the whole of word 5
        assert_eq!(first, [4, 0, 0, 0, 5]);
        assert_eq!(count(&trng, Event::RngSoftReset), 1);

        // restart, key from words 6..=9, data from word 10
        let mut second = [0u8; 4];
        trng.get_entropy(&mut second)?;
        assert_eq!(second, [10, 0, 0, 0]);
        assert_eq!(count(&trng, Event::RngSoftReset), 2);
        for i in 0..CONDITIONING_KEY_WORDS {
            assert_eq!(count(&trng, Event::ConditioningKeySet(i)), 2);
        }
        let rng = trng.hal_mut();
        let key: Vec<u32> = (0..CONDITIONING_KEY_WORDS)
            .map(|i| rng.conditioning_key(i))
            .collect();
        assert_eq!(key, [6, 7, 8, 9]);
        Ok(())
    }

    #[test]
    fn health_error_while_ready_restarts_transparently() -> Result<(), Error> {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut rng = SimRng::new().with_noise(Noise::Counter(0));
        // fails right after the conditioning key was read
        rng.fail_health_after(CONDITIONING_KEY_WORDS as u32);
        let mut trng = Trng::new(rng);

        let mut bytes = [0u8; MAX_ENTROPY_LEN];
        trng.get_entropy(&mut bytes)?;

        assert_eq!(count(&trng, Event::RngSoftReset), 2);
        assert_eq!(count(&trng, Event::ConditioningKeySet(0)), 2);
        assert!(!trng.hal().is_enabled());
        // nothing from before the fault reaches the caller
        assert!(bytes.chunks(4).all(|w| *w != [4, 0, 0, 0]));
        Ok(())
    }

    #[test]
    fn yield_and_sleep_policies_wait_for_ready() -> Result<(), Error> {
        let mut bytes = [0u8; 16];
        let mut trng = Trng::with_config(SimRng::new(), TrngConfig::default(), Yield);
        trng.get_entropy(&mut bytes)?;
        let mut trng = Trng::with_config(
            SimRng::new(),
            TrngConfig::default(),
            Sleep(Duration::from_micros(1)),
        );
        trng.get_entropy(&mut bytes)?;
        assert!(!trng.hal().is_enabled());
        Ok(())
    }

    #[test]
    fn oversized_request_never_touches_hardware() {
        let mut trng = counting_trng();
        let mut bytes = [0u8; MAX_ENTROPY_LEN + 1];
        let err = trng.get_entropy(&mut bytes).unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::EntropyTooLarge);
        assert_eq!(err.status(), -1);
        assert!(trng.hal().trace().is_empty());
    }

    #[test]
    fn max_request_is_served() -> Result<(), Error> {
        let mut trng = Trng::new(SimRng::new());
        let mut bytes = [0u8; MAX_ENTROPY_LEN];
        trng.get_entropy(&mut bytes)?;
        assert_ne!(bytes, [0u8; MAX_ENTROPY_LEN]);
        Ok(())
    }

    #[test]
    fn health_failure_restarts_transparently() -> Result<(), Error> {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut rng = SimRng::new().with_noise(Noise::Counter(0));
        rng.fail_startup(2);
        let mut trng = Trng::new(rng);

        let mut bytes = [0u8; 4];
        trng.get_entropy(&mut bytes)?;

        let resets = trng
            .hal()
            .trace()
            .iter()
            .filter(|e| **e == Event::RngSoftReset)
            .count();
        assert_eq!(resets, 3);
        assert!(!trng.hal().is_enabled());
        Ok(())
    }

    #[test]
    fn module_enabled_only_during_call() -> Result<(), Error> {
        let mut trng = counting_trng();
        let mut bytes = [0u8; 16];
        trng.get_entropy(&mut bytes)?;

        let trace = trng.hal().trace();
        assert_eq!(trace.first(), Some(&Event::ModuleEnable(Modules::RNG)));
        assert_eq!(trace.last(), Some(&Event::ModuleDisable(Modules::RNG)));
        assert!(!trng.hal().is_enabled());
        Ok(())
    }

    #[test]
    fn restart_writes_fixed_configuration() -> Result<(), Error> {
        let config = TrngConfig {
            clk_div: 2,
            off_timer: 7,
            init_wait: 1024,
            blocks_per_cycle: 2,
        };
        let mut trng = Trng::with_config(SimRng::new(), config, Spin);
        let mut bytes = [0u8; 4];
        trng.get_entropy(&mut bytes)?;

        let rng = trng.hal();
        assert_eq!(rng.clk_div(), 2);
        assert_eq!(rng.off_timer(), 7);
        assert_eq!(rng.init_wait(), 1024);
        assert_eq!(rng.control().number_128_blocks, 2);
        assert!(rng.control().enable);
        Ok(())
    }
}
