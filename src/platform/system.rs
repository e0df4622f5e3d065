//! Default clock and crypto capabilities backed by the host process.

// crates.io
use rand::Rng;
use sha2::{Digest, Sha256};
// self
use crate::{
	_prelude::*,
	platform::{ClockCapability, CryptoCapability},
};

/// Clock capability backed by the system UTC clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;
impl ClockCapability for SystemClock {
	fn now(&self) -> OffsetDateTime {
		OffsetDateTime::now_utc()
	}
}

/// Crypto capability backed by `sha2` and the process CSPRNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultCrypto;
impl CryptoCapability for DefaultCrypto {
	fn sha256(&self, data: &[u8]) -> [u8; 32] {
		let mut hasher = Sha256::new();

		hasher.update(data);

		hasher.finalize().into()
	}

	fn new_guid(&self) -> String {
		let mut bytes: [u8; 16] = rand::rng().random();

		// RFC 4122 version 4, variant 1.
		bytes[6] = (bytes[6] & 0x0f) | 0x40;
		bytes[8] = (bytes[8] & 0x3f) | 0x80;

		format!(
			"{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
			bytes[0],
			bytes[1],
			bytes[2],
			bytes[3],
			bytes[4],
			bytes[5],
			bytes[6],
			bytes[7],
			bytes[8],
			bytes[9],
			bytes[10],
			bytes[11],
			bytes[12],
			bytes[13],
			bytes[14],
			bytes[15],
		)
	}
}
