// SPDX-License-Identifier: MIT

//! A hardware backed implementation of the cryptographic random number
//! generator CTR_DRBG as defined by NIST [SP 800-90A
//! Rev. 1](https://csrc.nist.gov/publications/detail/sp/800-90a/rev-1/final),
//! for the CRACEN security peripheral.
//!
//! The generator is AES-256 CTR_DRBG without derivation function. Seed
//! material comes straight from the CRACEN noise generator
//! ([`trng::Trng`]) and every AES block is computed by the CryptoMaster
//! accelerator ([`ecb::CmAesEcb`]). Both drivers reach the hardware
//! only through the register traits in [`hal`], so a board crate
//! supplies the register access and this crate supplies the protocol.
//!
//! # Quick Example
//!
//! With the `std` feature, the [`sim`] module provides software models
//! of both peripherals, which is enough to exercise the whole stack on
//! a host.
//!
//! ```
//! # #[cfg(feature = "std")]
//! # {
//! use cracen_drbg::{
//!     ctr::CtrBuilder,
//!     ecb::CmAesEcb,
//!     error,
//!     sim::{SimCryptoMaster, SimRng},
//!     trng::Trng,
//! };
//!
//! let mut drbg = CtrBuilder::new(Trng::new(SimRng::new()), CmAesEcb::new(SimCryptoMaster::new()))
//!     .build();
//!
//! let mut random_data = [0u8; 32];
//! let status = error::status(drbg.get_random(Some(&mut random_data), 32));
//! assert_eq!(status, 0);
//! # }
//! ```
//!
//! On a target, implement [`hal::RngPeripheral`] and
//! [`hal::CryptoMaster`] for the device's register blocks and hand
//! them to [`trng::Trng::new`] and [`ecb::CmAesEcb::new`]. This
//! doesn't require the `std` feature.
//!
#![no_std]
#![cfg_attr(docsrs, feature(doc_cfg))]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

pub mod ctr;
pub mod ecb;
pub mod entropy;
pub mod error;
pub mod hal;
pub mod trng;

#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub mod sim;

#[cfg(feature = "std")]
#[cfg_attr(docsrs, doc(cfg(feature = "std")))]
pub mod sync;
