// SPDX-License-Identifier: MIT

//! Single-block AES-ECB on the CryptoMaster accelerator.
//!
//! A job is described by a chain of three fetch descriptors (AES
//! config word, key, input block) and one push descriptor (output
//! block). The descriptors live on the stack of
//! [`CmAesEcb::encrypt`] and are only valid for that call.
use crate::{
    error::{Error, ErrorKind},
    hal::{
        aes_engine, dma, CmInterrupt, CmStatus, CryptoMaster, DmaDescriptor, Enabled,
        IndirectMode, Modules, Poll, Spin,
    },
};
use core::{
    marker::PhantomData,
    mem::size_of,
    ptr,
    sync::atomic::{fence, Ordering},
};
use log::{error, trace};

pub const BLOCK_LEN: usize = 16;

/// One AES block, in cryptographic (big-endian) byte order.
pub type Block = [u8; BLOCK_LEN];

/// A block cipher able to encrypt a single block under a caller
/// supplied key.
pub trait BlockCipher {
    /// Encrypt `input` under `key`.
    ///
    /// # Error
    ///
    /// Returns an error if the key length is not supported or the
    /// underlying engine fails.
    fn encrypt_block(&mut self, key: &[u8], input: &Block) -> Result<Block, Error>;
}

impl<C> BlockCipher for &mut C
where
    C: BlockCipher + ?Sized,
{
    fn encrypt_block(&mut self, key: &[u8], input: &Block) -> Result<Block, Error> {
        (**self).encrypt_block(key, input)
    }
}

/// Descriptor chain for one AES-ECB block.
///
/// The chain is linked in place by [`AesEcbJob::link`]; after that the
/// job must not move until the hardware is done with it.
struct AesEcbJob<'a> {
    config: u32,
    fetch: [DmaDescriptor; 3],
    push: DmaDescriptor,
    _buffers: PhantomData<(&'a [u8], &'a mut Block)>,
}

impl<'a> AesEcbJob<'a> {
    fn new(key: &'a [u8], input: &'a Block, output: &'a mut Block) -> Self {
        let config = aes_engine::config(
            aes_engine::MODE_ECB,
            aes_engine::KEY_SW_PROGRAMMED,
            false,
            false,
            false,
        );
        let realign = |len: usize| len as u32 | dma::LENGTH_REALIGN;

        Self {
            config,
            fetch: [
                DmaDescriptor::new(
                    ptr::null_mut(),
                    realign(size_of::<u32>()),
                    dma::tag_aes_config(aes_engine::REG_OFFSET_CONFIG),
                ),
                DmaDescriptor::new(
                    key.as_ptr() as *mut u8,
                    realign(key.len()),
                    dma::tag_aes_config(aes_engine::REG_OFFSET_KEY),
                ),
                DmaDescriptor::new(
                    input.as_ptr() as *mut u8,
                    realign(BLOCK_LEN),
                    dma::TAG_LAST | dma::TAG_ENGINE_AES | dma::TAG_DATATYPE_AES_PAYLOAD,
                ),
            ],
            push: DmaDescriptor::new(output.as_mut_ptr(), realign(BLOCK_LEN), dma::TAG_LAST),
            _buffers: PhantomData,
        }
    }

    /// Fill in the self-referencing addresses and return the fetch and
    /// push chain heads.
    fn link(&mut self) -> (*const DmaDescriptor, *const DmaDescriptor) {
        self.fetch[0].addr = ptr::addr_of_mut!(self.config).cast();
        self.fetch[0].next = ptr::addr_of_mut!(self.fetch[1]);
        self.fetch[1].next = ptr::addr_of_mut!(self.fetch[2]);
        self.fetch[2].next = dma::DESC_STOP;
        self.push.next = dma::DESC_STOP;
        (self.fetch.as_ptr(), ptr::addr_of!(self.push))
    }
}

enum JobStatus {
    Busy,
    Done,
    Failed(ErrorKind),
}

fn job_status<H>(cm: &mut H) -> JobStatus
where
    H: CryptoMaster + ?Sized,
{
    let pending = cm.int_pending();
    if pending.contains(CmInterrupt::FETCH_ERROR) {
        return JobStatus::Failed(ErrorKind::FetchError);
    }
    if pending.contains(CmInterrupt::PUSH_ERROR) {
        return JobStatus::Failed(ErrorKind::PushError);
    }
    let busy = cm.status() & (CmStatus::BUSY_FETCH | CmStatus::BUSY_PUSH | CmStatus::PUSH_WAITING);
    if busy.is_empty() {
        JobStatus::Done
    } else {
        JobStatus::Busy
    }
}

/// AES-ECB engine driving the CryptoMaster.
///
/// Completion is detected by busy-polling; the accelerator finishes a
/// single block in a handful of cycles. There is no timeout.
///
/// # Example
///
/// ```
/// use cracen_drbg::{ecb::CmAesEcb, sim::SimCryptoMaster};
///
/// # use cracen_drbg::error::Error;
/// # fn main() -> Result<(), Error> {
/// let mut ecb = CmAesEcb::new(SimCryptoMaster::new());
/// let key = [0u8; 32];
/// let out = ecb.encrypt(&key, &[0u8; 16])?;
/// assert_eq!(out[0], 0xdc);
/// # Ok(())
/// # }
/// ```
pub struct CmAesEcb<H, P = Spin> {
    hal: H,
    poll: P,
}

impl<H> CmAesEcb<H>
where
    H: CryptoMaster,
{
    pub fn new(hal: H) -> Self {
        Self::with_poll(hal, Spin)
    }
}

impl<H, P> CmAesEcb<H, P>
where
    H: CryptoMaster,
    P: Poll,
{
    pub fn with_poll(hal: H, poll: P) -> Self {
        Self { hal, poll }
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

    /// Encrypt one block with a 128, 192 or 256-bit `key`.
    ///
    /// The accelerator is enabled for the duration of the call, and
    /// soft-reset and disabled before returning whatever the outcome.
    ///
    /// # Error
    ///
    /// Returns [`ErrorKind::InvalidInput`] for other key lengths,
    /// before the accelerator is touched. A DMA fetch or push error
    /// reported by the hardware is returned as
    /// [`ErrorKind::FetchError`] or [`ErrorKind::PushError`].
    pub fn encrypt(&mut self, key: &[u8], input: &Block) -> Result<Block, Error> {
        if !matches!(key.len(), 16 | 24 | 32) {
            return Err(Error::invalid_input());
        }

        let mut output = [0u8; BLOCK_LEN];
        let mut job = AesEcbJob::new(key, input, &mut output);
        let status = {
            let mut cm = Enabled::new(&mut self.hal, Modules::CRYPTOMASTER);
            let (fetch, push) = job.link();
            cm.set_fetch_addr(fetch);
            cm.set_push_addr(push);
            cm.set_indirect(IndirectMode::FETCH | IndirectMode::PUSH);

            // descriptors must be visible to the DMA before the start
            fence(Ordering::SeqCst);
            // SAFETY: `job`, `key`, `input` and `output` all outlive the
            // polling loop below, and `job` is not moved after linking.
            unsafe { cm.start() };

            let status = loop {
                match job_status(&mut *cm) {
                    JobStatus::Busy => self.poll.relax(),
                    status => break status,
                }
            };
            // the push DMA wrote `output` behind the compiler's back
            fence(Ordering::SeqCst);
            cm.soft_reset();
            status
        };

        match status {
            JobStatus::Failed(kind) => {
                error!("cryptomaster: aes-ecb job failed: {:?}", kind);
                Err(kind.into())
            }
            _ => {
                trace!("cryptomaster: aes-ecb job done");
                Ok(output)
            }
        }
    }
}

impl<H, P> BlockCipher for CmAesEcb<H, P>
where
    H: CryptoMaster,
    P: Poll,
{
    fn encrypt_block(&mut self, key: &[u8], input: &Block) -> Result<Block, Error> {
        self.encrypt(key, input)
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::{
        hal::Yield,
        sim::{Event, SimCryptoMaster},
    };

    fn fips197_input() -> Block {
        hex::decode("00112233445566778899aabbccddeeff")
            .unwrap()
            .try_into()
            .unwrap()
    }

    fn fips197_key(len: usize) -> alloc::vec::Vec<u8> {
        let key =
            hex::decode("000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f")
                .unwrap();
        key[..len].into()
    }

    #[test]
    fn aes_256_known_answer() -> Result<(), Error> {
        let mut ecb = CmAesEcb::new(SimCryptoMaster::new());
        let out = ecb.encrypt(&fips197_key(32), &fips197_input())?;
        assert_eq!(hex::encode(out), "8ea2b7ca516745bfeafc49904b496089");
        Ok(())
    }

    #[test]
    fn aes_128_and_192_known_answers() -> Result<(), Error> {
        let mut ecb = CmAesEcb::new(SimCryptoMaster::new());
        let out = ecb.encrypt(&fips197_key(16), &fips197_input())?;
        assert_eq!(hex::encode(out), "69c4e0d86a7b0430d8cdb78070b4c55a");
        let out = ecb.encrypt(&fips197_key(24), &fips197_input())?;
        assert_eq!(hex::encode(out), "dda97ca4864cdfe06eaf70a0ec0d7191");
        Ok(())
    }

    #[test]
    fn yielding_poll_waits_for_completion() -> Result<(), Error> {
        let cm = SimCryptoMaster::new().with_busy_polls(3);
        let mut ecb = CmAesEcb::with_poll(cm, Yield);
        let out = ecb.encrypt(&fips197_key(32), &fips197_input())?;
        assert_eq!(hex::encode(out), "8ea2b7ca516745bfeafc49904b496089");
        assert!(!ecb.hal().is_enabled());
        Ok(())
    }

    #[test]
    fn unsupported_key_length_is_rejected_before_hardware() {
        let mut ecb = CmAesEcb::new(SimCryptoMaster::new());
        let err = ecb.encrypt(&[0u8; 20], &[0u8; BLOCK_LEN]).unwrap_err();
        assert!(err.is_invalid_input());
        assert!(ecb.hal().trace().is_empty());
    }

    #[test]
    fn job_lifecycle_is_scoped() -> Result<(), Error> {
        let mut ecb = CmAesEcb::new(SimCryptoMaster::new().with_busy_polls(5));
        ecb.encrypt(&[0u8; 32], &[0u8; BLOCK_LEN])?;
        assert_eq!(
            ecb.hal().trace(),
            [
                Event::ModuleEnable(Modules::CRYPTOMASTER),
                Event::CmStart,
                Event::CmSoftReset,
                Event::ModuleDisable(Modules::CRYPTOMASTER),
            ]
        );
        Ok(())
    }

    #[test]
    fn fetch_error_is_reported_and_cleaned_up() {
        let _ = env_logger::builder().is_test(true).try_init();
        let mut cm = SimCryptoMaster::new();
        cm.fail_job(1, CmInterrupt::FETCH_ERROR);
        let mut ecb = CmAesEcb::new(cm);

        let err = ecb.encrypt(&[0u8; 32], &[0u8; BLOCK_LEN]).unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::FetchError);
        assert_eq!(err.status(), -1);
        assert!(!ecb.hal().is_enabled());
        assert_eq!(ecb.hal().trace().last(), Some(&Event::ModuleDisable(Modules::CRYPTOMASTER)));

        // the engine is usable again after the soft reset
        let out = ecb.encrypt(&fips197_key(32), &fips197_input()).unwrap();
        assert_eq!(hex::encode(out), "8ea2b7ca516745bfeafc49904b496089");
    }

    #[test]
    fn push_error_is_distinguished() {
        let mut cm = SimCryptoMaster::new();
        cm.fail_job(1, CmInterrupt::PUSH_ERROR);
        let mut ecb = CmAesEcb::new(cm);

        let err = ecb.encrypt(&[0u8; 16], &[0u8; BLOCK_LEN]).unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::PushError);
        assert!(!ecb.hal().is_enabled());
    }

    #[test]
    fn descriptor_chain_layout() {
        let key = [0x11u8; 32];
        let input = [0x22u8; BLOCK_LEN];
        let mut output = [0u8; BLOCK_LEN];
        let mut job = AesEcbJob::new(&key, &input, &mut output);
        let (fetch, push) = job.link();

        assert_eq!(fetch, job.fetch.as_ptr());
        assert_eq!(push, ptr::addr_of!(job.push));
        assert_eq!(job.fetch[0].next as *const DmaDescriptor, ptr::addr_of!(job.fetch[1]));
        assert_eq!(job.fetch[1].next as *const DmaDescriptor, ptr::addr_of!(job.fetch[2]));
        assert_eq!(job.fetch[2].next, dma::DESC_STOP);
        assert_eq!(job.push.next, dma::DESC_STOP);

        assert_eq!(job.fetch[0].length, 4 | dma::LENGTH_REALIGN);
        assert_eq!(job.fetch[1].length, 32 | dma::LENGTH_REALIGN);
        assert_eq!(job.fetch[2].length, 16 | dma::LENGTH_REALIGN);
        assert_eq!(job.push.length, 16 | dma::LENGTH_REALIGN);
        assert_eq!(job.fetch[0].addr as *const u32, ptr::addr_of!(job.config));
        assert_ne!(job.fetch[2].tag & dma::TAG_LAST, 0);
        assert_eq!(job.fetch[0].tag & dma::TAG_LAST, 0);
        assert_eq!(job.push.tag, dma::TAG_LAST);
        assert_eq!(aes_engine::mode(job.config), aes_engine::MODE_ECB);
    }
}
