// Copyright 2024-2026 the chalk-engine authors.
// This file is part of chalk-engine.

// chalk-engine is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// chalk-engine is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with chalk-engine.  If not, see <http://www.gnu.org/licenses/>.

//! PIN digests, human-typeable short codes, and the clock seam.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use sha2::{Digest, Sha256};

use crate::types::SHORT_CODE_LEN;

/// Prefix every table code carries on the wire.
pub const SHORT_CODE_PREFIX: &str = "CHALK-";

/// Excludes I, O, 0 and 1 so codes survive being read off a chalkboard.
pub const SHORT_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Hash a PIN to its stored form: SHA-256, lowercase hex.
pub fn hash_pin(pin: &str) -> String {
	let digest = Sha256::digest(pin.as_bytes());
	hex::encode(digest)
}

/// Constant-time comparison of a candidate PIN against a stored digest.
pub fn verify_pin(pin: &str, stored_hash: &str) -> bool {
	let candidate = hash_pin(pin);
	if candidate.len() != stored_hash.len() {
		return false;
	}
	// xor-fold over the fixed-length hex digests
	candidate.bytes().zip(stored_hash.bytes()).fold(0u8, |acc, (a, b)| acc | (a ^ b)) == 0
}

/// Trim and uppercase, the only normalization applied to user-typed codes.
pub fn normalize_code(code: &str) -> String {
	code.trim().to_uppercase()
}

/// `CHALK-` followed by exactly four alphabet characters.
pub fn is_valid_code(code: &str) -> bool {
	match code.strip_prefix(SHORT_CODE_PREFIX) {
		Some(suffix) => {
			suffix.len() == SHORT_CODE_LEN && suffix.bytes().all(|b| SHORT_CODE_ALPHABET.contains(&b))
		}
		None => false,
	}
}

/// A source of short codes. The coordinator retries generation on index
/// collision, so implementations need not be collision-free.
pub trait CodeGenerator: Send + Sync + 'static {
	fn generate(&self) -> String;
}

/// Default generator: uniform draws from [`SHORT_CODE_ALPHABET`].
pub struct RandomCodes;

impl CodeGenerator for RandomCodes {
	fn generate(&self) -> String {
		let mut rng = rand::thread_rng();
		let suffix: String = (0..SHORT_CODE_LEN)
			.map(|_| SHORT_CODE_ALPHABET[rng.gen_range(0..SHORT_CODE_ALPHABET.len())] as char)
			.collect();
		format!("{}{}", SHORT_CODE_PREFIX, suffix)
	}
}

/// Wall-clock seam. Engines take `now` as an argument; only the coordinator
/// reads a clock, and only through this trait.
pub trait Clock: Send + Sync + 'static {
	/// Milliseconds since the Unix epoch.
	fn now_ms(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
	fn now_ms(&self) -> i64 {
		SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn should_hash_pin_to_lowercase_hex() {
		// SHA-256("1234")
		assert_eq!(hash_pin("1234"), "03ac674216f3e15c761ee1a5e255f067953623c8b388b4459e13f978d7c846f4");
	}

	#[test]
	fn should_verify_only_the_matching_pin() {
		let stored = hash_pin("1234");
		assert!(verify_pin("1234", &stored));
		assert!(!verify_pin("4321", &stored));
		assert!(!verify_pin("1234", "not-a-digest"));
	}

	#[test]
	fn should_normalize_and_validate_codes() {
		assert_eq!(normalize_code("  chalk-ab2z "), "CHALK-AB2Z");
		assert!(is_valid_code("CHALK-AB2Z"));
		assert!(!is_valid_code("CHALK-AB2"));
		assert!(!is_valid_code("CHALK-AB21")); // 1 is not in the alphabet
		assert!(!is_valid_code("CHALK-ABIO")); // neither are I and O
		assert!(!is_valid_code("AB2Z"));
	}

	#[test]
	fn should_generate_well_formed_codes() {
		for _ in 0..100 {
			let code = RandomCodes.generate();
			assert!(is_valid_code(&code), "bad code {}", code);
		}
	}
}
