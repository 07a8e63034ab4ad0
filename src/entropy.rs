// SPDX-License-Identifier: MIT

//! Traits for defining entropy sources.
use crate::error::Error;

/// Represents a source of cryptograplicly secure random data. Its
/// primary use-case is to seed the DRBG.
///
/// The hardware implementation is [`Trng`](crate::trng::Trng). Any
/// other source can be plugged in, which is how the DRBG is tested
/// against fixed seed material.
///
/// # Example
///
/// ```
/// use cracen_drbg::{entropy::Entropy, error::Error};
///
/// struct Fixed([u8; 48]);
///
/// impl Entropy for Fixed {
///     fn fill_bytes(&mut self, bytes: &mut [u8]) -> Result<(), Error> {
///         bytes.copy_from_slice(&self.0[..bytes.len()]);
///         Ok(())
///     }
/// }
/// ```
pub trait Entropy {
    /// Fill `bytes` with random data from the entropy source.
    ///
    /// # Error
    ///
    /// Returns an error if there is a problem with the underlying
    /// entropy source.
    fn fill_bytes(&mut self, bytes: &mut [u8]) -> Result<(), Error>;
}

impl<E> Entropy for &mut E
where
    E: Entropy + ?Sized,
{
    fn fill_bytes(&mut self, bytes: &mut [u8]) -> Result<(), Error> {
        (**self).fill_bytes(bytes)
    }
}
