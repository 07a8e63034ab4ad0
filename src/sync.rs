// SPDX-License-Identifier: MIT

//! A thread-safe interface for the CTR_DRBG algorithm.
//!
//! A [`CtrDrbg`] instance is not reentrant. [`SharedCtrDrbg`] wraps
//! one in a mutex so several threads can draw from the same hardware
//! backed generator, one request at a time.
use crate::{
    ctr::CtrDrbg,
    ecb::BlockCipher,
    entropy::Entropy,
    error::Error,
};

use log::error;
use std::sync::{Arc, Mutex};

#[cfg(feature = "rand_core")]
use rand_core::{TryCryptoRng, TryRngCore};

/// A cloneable handle to a mutex-protected instance of CTR_DRBG.
///
/// Every clone refers to the same instance. If a thread panics while
/// holding the instance, every later call fails with a generic
/// failure.
///
/// # Example
///
/// ```
/// use cracen_drbg::{
///     ctr::CtrBuilder,
///     ecb::CmAesEcb,
///     sim::{SimCryptoMaster, SimRng},
///     sync::SharedCtrDrbg,
///     trng::Trng,
/// };
/// use std::thread;
///
/// # use cracen_drbg::error::Error;
/// # fn main() -> Result<(), Error> {
/// let drbg = CtrBuilder::new(Trng::new(SimRng::new()), CmAesEcb::new(SimCryptoMaster::new()))
///     .build();
/// let shared = SharedCtrDrbg::new(drbg);
///
/// let handle = shared.clone();
/// thread::spawn(move || {
///     let mut key = [0u8; 32];
///     handle.fill_bytes(&mut key).unwrap();
/// })
/// .join()
/// .unwrap();
///
/// let mut nonce = [0u8; 12];
/// shared.get_random(Some(&mut nonce), 12)?;
/// # Ok(())
/// # }
/// ```
pub struct SharedCtrDrbg<E, C> {
    rng: Arc<Mutex<CtrDrbg<E, C>>>,
}

impl<E, C> Clone for SharedCtrDrbg<E, C> {
    fn clone(&self) -> Self {
        Self {
            rng: Arc::clone(&self.rng),
        }
    }
}

impl<E, C> SharedCtrDrbg<E, C>
where
    E: Entropy,
    C: BlockCipher,
{
    pub fn new(drbg: CtrDrbg<E, C>) -> Self {
        Self {
            rng: Arc::new(Mutex::new(drbg)),
        }
    }

    /// Run `f` with exclusive access to the instance.
    pub fn with<F, R>(&self, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut CtrDrbg<E, C>) -> R,
    {
        match self.rng.lock() {
            Ok(mut rng) => Ok(f(&mut rng)),
            Err(_) => {
                error!("ctr_drbg: instance poisoned by a panicking thread");
                Err(Error::failure())
            }
        }
    }

    /// See [`init`](crate::ctr::CtrDrbg::init) for details.
    pub fn init(&self) -> Result<(), Error> {
        self.with(|rng| rng.init())?
    }

    /// See [`reseed`](crate::ctr::CtrDrbg::reseed) for details.
    pub fn reseed(&self) -> Result<(), Error> {
        self.with(|rng| rng.reseed())?
    }

    /// See [`get_random`](crate::ctr::CtrDrbg::get_random) for details.
    pub fn get_random(&self, bytes: Option<&mut [u8]>, size: usize) -> Result<(), Error> {
        self.with(|rng| rng.get_random(bytes, size))?
    }

    /// See [`fill_bytes`](crate::ctr::CtrDrbg::fill_bytes) for details.
    pub fn fill_bytes(&self, bytes: &mut [u8]) -> Result<(), Error> {
        self.with(|rng| rng.fill_bytes(bytes))?
    }

    pub fn reseed_counter(&self) -> Result<Option<u64>, Error> {
        self.with(|rng| rng.reseed_counter())
    }
}

#[cfg(feature = "rand_core")]
#[cfg_attr(docsrs, doc(cfg(feature = "rand_core")))]
impl<E, C> TryCryptoRng for SharedCtrDrbg<E, C>
where
    E: Entropy,
    C: BlockCipher,
{
}

#[cfg(feature = "rand_core")]
#[cfg_attr(docsrs, doc(cfg(feature = "rand_core")))]
impl<E, C> TryRngCore for SharedCtrDrbg<E, C>
where
    E: Entropy,
    C: BlockCipher,
{
    type Error = Error;

    fn try_next_u32(&mut self) -> Result<u32, Self::Error> {
        self.with(|rng| rng.try_next_u32())?
    }

    fn try_next_u64(&mut self) -> Result<u64, Self::Error> {
        self.with(|rng| rng.try_next_u64())?
    }

    fn try_fill_bytes(&mut self, bytes: &mut [u8]) -> Result<(), Self::Error> {
        self.fill_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        ctr::CtrBuilder,
        ecb::CmAesEcb,
        error::{Error, ErrorKind},
        sim::{SimCryptoMaster, SimRng},
        sync::SharedCtrDrbg,
        trng::Trng,
    };
    use std::{thread, vec::Vec};

    type SimDrbg = SharedCtrDrbg<Trng<SimRng>, CmAesEcb<SimCryptoMaster>>;

    fn shared() -> SimDrbg {
        let drbg = CtrBuilder::new(Trng::new(SimRng::new()), CmAesEcb::new(SimCryptoMaster::new()))
            .build();
        SharedCtrDrbg::new(drbg)
    }

    #[test]
    fn single_thread() -> Result<(), Error> {
        let rng = shared();
        let mut buf = [0u8; 8];
        rng.fill_bytes(&mut buf)?;
        assert_ne!([0u8; 8], buf);
        assert_eq!(rng.reseed_counter()?, Some(2));
        Ok(())
    }

    #[test]
    fn multi_thread() -> Result<(), Error> {
        let rng = shared();
        rng.init()?;

        let num_threads = 32;
        let mut handles = Vec::with_capacity(num_threads);
        for _ in 0..num_threads {
            let rng = rng.clone();
            let h = thread::spawn(move || {
                let mut buf = [0u8; 8];
                rng.get_random(Some(&mut buf), 8).unwrap();
                buf
            });
            handles.push(h)
        }
        let mut outputs: Vec<[u8; 8]> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        outputs.sort();
        outputs.dedup();
        assert_eq!(outputs.len(), num_threads);
        assert_eq!(rng.reseed_counter()?, Some(1 + num_threads as u64));
        Ok(())
    }

    #[test]
    fn clones_share_one_instance() -> Result<(), Error> {
        let a = shared();
        let b = a.clone();
        a.reseed()?;
        let mut buf = [0u8; 16];
        b.get_random(Some(&mut buf), 16)?;
        assert_eq!(a.reseed_counter()?, Some(2));
        Ok(())
    }

    #[test]
    fn poisoned_instance_fails() {
        let rng = shared();
        let handle = rng.clone();
        let result = thread::spawn(move || {
            let _ = handle.with(|_| panic!("poison"));
        })
        .join();
        assert!(result.is_err());

        let mut buf = [0u8; 8];
        let err = rng.get_random(Some(&mut buf), 8).unwrap_err();
        assert_eq!(*err.kind(), ErrorKind::Failure);
        assert_eq!(err.status(), -1);
    }
}
