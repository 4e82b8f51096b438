//! Pseudorandom operation values.

use std::io::{self, Read};

use bytes::Bytes;
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};

/// Randomized contents of a value.
///
/// Clone this instance to reproduce the same contents, or construct it from the
/// same seed.
#[derive(Debug, Clone)]
pub struct Payload {
    /// The remaining length of the payload in bytes.
    pub len: u64,
    /// The RNG used to fill the payload with random bytes.
    rng: SmallRng,
}

impl Payload {
    /// Creates a payload of `len` bytes from a fixed seed.
    pub fn from_seed(len: u64, seed: u64) -> Self {
        Self {
            len,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Creates a payload of `len` bytes from a random seed.
    pub fn random(len: u64) -> Self {
        Self::from_seed(len, rand::random())
    }

    /// Reads the whole payload into memory.
    pub fn into_bytes(mut self) -> Bytes {
        let mut buf = Vec::with_capacity(self.len as usize);
        // Reading from the RNG cannot fail.
        let _ = self.read_to_end(&mut buf);
        buf.into()
    }
}

impl Read for Payload {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len_to_fill = (buf.len() as u64).min(self.len) as usize;

        let fill_buf = &mut buf[..len_to_fill];
        self.rng.fill_bytes(fill_buf);

        self.len -= len_to_fill as u64;
        Ok(len_to_fill)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn produces_requested_length() {
        for len in [0, 1, 7, 8192, 100_000] {
            assert_eq!(Payload::random(len).into_bytes().len() as u64, len);
        }
    }

    #[test]
    fn same_seed_same_contents() {
        let a = Payload::from_seed(64, 42).into_bytes();
        let b = Payload::from_seed(64, 42).into_bytes();
        let c = Payload::from_seed(64, 43).into_bytes();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
