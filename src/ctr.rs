// SPDX-License-Identifier: MIT

//! A module to facilitate the CTR_DRBG algorithm.
//!
//! The CTR_DRBG algorithm is implemented via the [`CtrDrbg`]
//! type. This type may be instantiated using the builder class
//! [`CtrBuilder`].
//!
//! The construction is AES-256 without derivation function: seed
//! material is 48 bytes of full-entropy input taken directly from the
//! entropy source, and every AES invocation is delegated to a
//! [`BlockCipher`], normally the CryptoMaster engine.
//!
use crate::{
    ecb::{Block, BlockCipher, BLOCK_LEN},
    entropy::Entropy,
    error::Error,
};

use core::iter::zip;
use log::{debug, error};
use zeroize::Zeroize;

#[cfg(feature = "rand_core")]
use rand_core::{TryCryptoRng, TryRngCore};

const KEY_LEN: usize = 32;
const SEED_LEN: usize = KEY_LEN + BLOCK_LEN;

type Key = [u8; KEY_LEN];
type SeedData = [u8; SEED_LEN];

/// Largest request served by a single generate call (NIST SP 800-90A
/// Rev. 1, Table 3).
pub const MAX_BYTE_REQUEST: usize = 1 << 16;

/// Largest reseed interval allowed for AES-256 CTR_DRBG.
pub const MAX_RESEED_INTERVAL: u64 = 1 << 48;

/// Implementation of CTR_DRBG using AES-256 without derivation
/// function as outlined by [SP 800-90A
/// Rev. 1](https://csrc.nist.gov/publications/detail/sp/800-90a/rev-1/final). Instantiation
/// of this type is performed using the builder class [`CtrBuilder`].
///
/// An instance starts out uninitialized. It is seeded either by an
/// explicit [`init`](CtrDrbg::init) or implicitly by the first
/// request. Operations are not reentrant; share an instance between
/// threads through [`SharedCtrDrbg`](crate::sync::SharedCtrDrbg).
///
/// # Example
///
/// ```
/// use cracen_drbg::{
///     ctr::CtrBuilder,
///     ecb::CmAesEcb,
///     sim::{SimCryptoMaster, SimRng},
///     trng::Trng,
/// };
///
/// # use cracen_drbg::error::Error;
/// #
/// # fn main() -> Result<(), Error> {
/// #
/// // Build a new instance
/// let trng = Trng::new(SimRng::new());
/// let ecb = CmAesEcb::new(SimCryptoMaster::new());
/// let mut drbg = CtrBuilder::new(trng, ecb).build();
///
/// // Seed it
/// drbg.init()?;
///
/// // Generate random data
/// let mut random_data = [0u8; 32];
/// drbg.get_random(Some(&mut random_data), 32)?;
///
/// // Reseed the instance
/// drbg.reseed()?;
/// #
/// # Ok(())
/// # }
/// ```
pub struct CtrDrbg<E, C> {
    v_blk: Block,
    key: Key,
    reseed_itr: u64,
    reseed_ctr: u64,
    initialized: bool,
    entropy: E,
    cipher: C,
}

/// Builder class for allocating `CtrDrbg` instances.
///
/// # Example
/// ```
/// use cracen_drbg::{
///     ctr::CtrBuilder,
///     ecb::CmAesEcb,
///     sim::{SimCryptoMaster, SimRng},
///     trng::Trng,
/// };
///
/// let drbg = CtrBuilder::new(Trng::new(SimRng::new()), CmAesEcb::new(SimCryptoMaster::new()))
///     .reseed_interval(1 << 14)
///     .build();
/// assert!(!drbg.is_initialized());
/// ```
#[derive(Debug)]
pub struct CtrBuilder<E, C> {
    reseed_itr: u64,
    entropy: E,
    cipher: C,
}

/// Increment a slice of bytes by 1 in big-endian order.
fn inc_bytes(block: &mut [u8]) {
    for bit in block.iter_mut().rev() {
        if *bit == 0xff {
            *bit = 0;
        } else {
            *bit += 1;
            break;
        }
    }
}

/// Log `cause` and collapse it into the generic DRBG failure.
fn failure(cause: Error) -> Error {
    error!("ctr_drbg: {}", cause);
    Error::failure()
}

impl<E, C> CtrBuilder<E, C>
where
    E: Entropy,
    C: BlockCipher,
{
    pub fn new(entropy: E, cipher: C) -> Self {
        Self {
            reseed_itr: MAX_RESEED_INTERVAL,
            entropy,
            cipher,
        }
    }

    /// Specify the reseed interval for the CTR_DRBG instance.
    ///
    /// A reseed happens automatically before any request that would
    /// bring the reseed counter to this value. Lowering it increases
    /// security at the cost of more frequent calls to the entropy
    /// source.
    ///
    /// By default, this value is 2^48.
    ///
    /// # Panics
    ///
    /// The reseed interval must be non-zero and cannot exceed
    /// 2^48. This function panics otherwise.
    pub fn reseed_interval(mut self, reseed_itr: u64) -> CtrBuilder<E, C> {
        if reseed_itr > MAX_RESEED_INTERVAL {
            panic!("CtrDrbg: reseed interval exceeds max interval")
        }
        if reseed_itr == 0 {
            panic!("CtrDrbg: reseed interval is zero")
        }
        self.reseed_itr = reseed_itr;
        self
    }

    /// Build and return a new, uninitialized [`CtrDrbg`] instance.
    /// No hardware is touched until the instance is first used.
    pub fn build(self) -> CtrDrbg<E, C> {
        CtrDrbg {
            v_blk: [0; BLOCK_LEN],
            key: [0; KEY_LEN],
            reseed_itr: self.reseed_itr,
            reseed_ctr: 0,
            initialized: false,
            entropy: self.entropy,
            cipher: self.cipher,
        }
    }
}

impl<E, C> Drop for CtrDrbg<E, C> {
    fn drop(&mut self) {
        self.wipe();
    }
}

impl<E, C> CtrDrbg<E, C>
where
    E: Entropy,
    C: BlockCipher,
{
    /// Zero the state and seed it from the entropy source.
    ///
    /// Meant to be called once. Calling it again discards the
    /// current state and starts over from fresh entropy.
    ///
    /// # Error
    ///
    /// Returns a generic failure if the entropy source or the block
    /// cipher fails. The instance stays uninitialized in that case.
    pub fn init(&mut self) -> Result<(), Error> {
        self.v_blk = [0; BLOCK_LEN];
        self.key = [0; KEY_LEN];
        self.reseed_ctr = 0;
        self.initialized = false;

        self.reseed()?;
        self.initialized = true;
        debug!("ctr_drbg: instantiated");
        Ok(())
    }

    /// Reseed with 48 bytes (key length plus block length) of new
    /// entropy.
    ///
    /// # Error
    ///
    /// Returns a generic failure if the entropy source or the block
    /// cipher fails.
    pub fn reseed(&mut self) -> Result<(), Error> {
        let mut seed: SeedData = [0; SEED_LEN];
        let result = match self.entropy.fill_bytes(&mut seed) {
            Ok(()) => self.update(Some(&seed)),
            Err(e) => Err(e),
        };
        seed.zeroize();
        result.map_err(failure)?;

        self.reseed_ctr = 1;
        debug!("ctr_drbg: reseeded");
        Ok(())
    }

    /// Write `size` random bytes to the front of `bytes`.
    ///
    /// `None` stands for a missing destination buffer. The instance
    /// is initialized on first use, and reseeded first if this request
    /// would bring the reseed counter to the reseed interval.
    ///
    /// A zero `size` succeeds without touching the hardware.
    ///
    /// # Error
    ///
    /// Returns an invalid input error, before touching the hardware,
    /// if `bytes` is `None` or shorter than `size`, or if `size`
    /// exceeds [`MAX_BYTE_REQUEST`]. Any entropy or block cipher
    /// failure is returned as a generic failure. In that case bytes
    /// already written to `bytes` are left in place and must not be
    /// used.
    pub fn get_random(&mut self, bytes: Option<&mut [u8]>, size: usize) -> Result<(), Error> {
        let bytes = match bytes {
            Some(buf) if buf.len() >= size => buf,
            None if size == 0 => return Ok(()),
            _ => return Err(Error::invalid_input()),
        };
        if size > MAX_BYTE_REQUEST {
            return Err(Error::invalid_input());
        }
        if size == 0 {
            return Ok(());
        }
        self.generate(&mut bytes[..size])
    }

    /// Fill the slice `bytes` with random data.
    ///
    /// There is no limit to the length of `bytes`. The standard does
    /// specify a limit of 2^16 bytes per request, so `bytes` is passed
    /// to the underlying generate function in chunks no larger than
    /// the limit.
    ///
    /// # Error
    ///
    /// Returns a generic failure if the entropy source or the block
    /// cipher fails.
    pub fn fill_bytes(&mut self, bytes: &mut [u8]) -> Result<(), Error> {
        for blk in bytes.chunks_mut(MAX_BYTE_REQUEST) {
            self.generate(blk)?;
        }
        Ok(())
    }

    fn generate(&mut self, bytes: &mut [u8]) -> Result<(), Error> {
        debug_assert!(bytes.len() <= MAX_BYTE_REQUEST);

        if !self.initialized {
            self.init()?;
        }
        if self.reseed_ctr.saturating_add(1) >= self.reseed_itr {
            self.reseed()?;
        }

        for blk in bytes.chunks_mut(BLOCK_LEN) {
            inc_bytes(&mut self.v_blk);
            let out = self
                .cipher
                .encrypt_block(&self.key, &self.v_blk)
                .map_err(failure)?;
            blk.copy_from_slice(&out[..blk.len()]);
        }
        self.update(None).map_err(failure)?;
        self.reseed_ctr += 1;
        Ok(())
    }

    /// CTR_DRBG_Update. Nothing is committed unless all three blocks
    /// were encrypted.
    fn update(&mut self, data: Option<&SeedData>) -> Result<(), Error> {
        let mut v_blk = self.v_blk;
        let mut tmp_buf: SeedData = [0; SEED_LEN];
        let mut result = Ok(());
        for tmp_blk in tmp_buf.chunks_exact_mut(BLOCK_LEN) {
            inc_bytes(&mut v_blk);
            match self.cipher.encrypt_block(&self.key, &v_blk) {
                Ok(out) => tmp_blk.copy_from_slice(&out),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        if result.is_ok() {
            if let Some(data) = data {
                for (i, j) in zip(tmp_buf.iter_mut(), data) {
                    *i ^= *j
                }
            }
            self.key.copy_from_slice(&tmp_buf[..KEY_LEN]);
            self.v_blk.copy_from_slice(&tmp_buf[KEY_LEN..]);
        }
        v_blk.zeroize();
        tmp_buf.zeroize();
        result
    }
}

impl<E, C> CtrDrbg<E, C> {
    /// Scrub key and V. The instance must be re-initialized before
    /// further use.
    fn wipe(&mut self) {
        self.v_blk.zeroize();
        self.key.zeroize();
        self.reseed_ctr = 0;
        self.initialized = false;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Number of requests served since the last reseed, plus one.
    /// `None` until the instance is initialized.
    pub fn reseed_counter(&self) -> Option<u64> {
        self.initialized.then_some(self.reseed_ctr)
    }

    pub fn reseed_interval(&self) -> u64 {
        self.reseed_itr
    }

    pub fn entropy(&self) -> &E {
        &self.entropy
    }

    pub fn entropy_mut(&mut self) -> &mut E {
        &mut self.entropy
    }

    pub fn cipher(&self) -> &C {
        &self.cipher
    }

    pub fn cipher_mut(&mut self) -> &mut C {
        &mut self.cipher
    }
}

#[cfg(feature = "rand_core")]
#[cfg_attr(docsrs, doc(cfg(feature = "rand_core")))]
impl<E, C> TryCryptoRng for CtrDrbg<E, C>
where
    E: Entropy,
    C: BlockCipher,
{
}

#[cfg(feature = "rand_core")]
#[cfg_attr(docsrs, doc(cfg(feature = "rand_core")))]
impl<E, C> TryRngCore for CtrDrbg<E, C>
where
    E: Entropy,
    C: BlockCipher,
{
    type Error = Error;

    fn try_next_u32(&mut self) -> Result<u32, Self::Error> {
        let mut buf = [0u8; 4];
        self.fill_bytes(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn try_next_u64(&mut self) -> Result<u64, Self::Error> {
        let mut buf = [0u8; 8];
        self.fill_bytes(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn try_fill_bytes(&mut self, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.fill_bytes(bytes)
    }
}
