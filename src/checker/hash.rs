//! Fingerprint computation for a watched endpoint's response body.

// crates.io
use md5::{Digest as _, Md5};
use regex::Regex;
use sha2::Sha256;
// self
use crate::{_prelude::*, model::HashType};

/// The character class is `0-9a-x`, not `0-9a-f` — UUIDs only ever use hex digits, so this almost
/// certainly started life as a typo. Preserved verbatim: correcting it would change which
/// substrings match and silently alter every stored hash for existing registrations.
const DEVICE_ID_PATTERN: &str = "urn:infai:ses:device:[0-9a-x-]{36}";

fn device_id_regex() -> &'static Regex {
	static REGEX: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();

	REGEX.get_or_init(|| Regex::new(DEVICE_ID_PATTERN).expect("static pattern is valid"))
}

/// Compute the fingerprint of `body` under `hash_type`.
pub fn fingerprint(hash_type: HashType, body: &[u8]) -> Result<String> {
	match hash_type {
		HashType::Md5 => Ok(hex_md5(body)),
		HashType::Sha256 => Ok(hex_sha256(body)),
		HashType::DeviceIds => device_ids_fingerprint(body),
	}
}

fn hex_md5(body: &[u8]) -> String {
	hex::encode(Md5::digest(body))
}

fn hex_sha256(body: &[u8]) -> String {
	hex::encode(Sha256::digest(body))
}

fn device_ids_fingerprint(body: &[u8]) -> Result<String> {
	let text = String::from_utf8_lossy(body);
	let mut ids: Vec<&str> = device_id_regex().find_iter(&text).map(|m| m.as_str()).collect();

	ids.sort_unstable();

	// A body with no matches hashes `null`, not `[]`: an empty id list is the absence of a value,
	// not an empty array.
	let encoded = if ids.is_empty() { b"null".to_vec() } else { serde_json::to_vec(&ids)? };

	Ok(hex_md5(&encoded))
}

mod hex {
	pub fn encode(bytes: impl AsRef<[u8]>) -> String {
		use std::fmt::Write as _;

		bytes.as_ref().iter().fold(String::new(), |mut out, byte| {
			let _ = write!(out, "{byte:02x}");

			out
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn md5_matches_known_vector() {
		assert_eq!(fingerprint(HashType::Md5, b"foobar123").unwrap(), "ae2d699aca20886f6bed96a0425c6168");
	}

	#[test]
	fn sha256_is_deterministic() {
		let a = fingerprint(HashType::Sha256, b"hello").unwrap();
		let b = fingerprint(HashType::Sha256, b"hello").unwrap();
		assert_eq!(a, b);
		assert_eq!(a.len(), 64);
	}

	#[test]
	fn device_ids_are_order_independent() {
		let a = "urn:infai:ses:device:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa urn:infai:ses:device:bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
		let b = "urn:infai:ses:device:bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb urn:infai:ses:device:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

		assert_eq!(
			fingerprint(HashType::DeviceIds, a.as_bytes()).unwrap(),
			fingerprint(HashType::DeviceIds, b.as_bytes()).unwrap()
		);
	}

	#[test]
	fn device_ids_change_when_set_changes() {
		let two = "urn:infai:ses:device:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa urn:infai:ses:device:bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";
		let three = format!("{two} urn:infai:ses:device:cccccccccccccccccccccccccccccccccccc");

		assert_ne!(
			fingerprint(HashType::DeviceIds, two.as_bytes()).unwrap(),
			fingerprint(HashType::DeviceIds, three.as_bytes()).unwrap()
		);
	}

	#[test]
	fn device_ids_empty_set_hashes_null() {
		assert_eq!(
			fingerprint(HashType::DeviceIds, b"no ids in this body").unwrap(),
			"37a6259cc0c1dae299a7866489dff0bd"
		);
	}
}
