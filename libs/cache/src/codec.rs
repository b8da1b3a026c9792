//! Framing of values stored in the distributed tier
//!
//! Every record starts with a single marker byte telling raw JSON apart
//! from gzip compressed JSON

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde_json::Value;

const RAW: u8 = b'r';
const GZIP: u8 = b'z';

/// Encode a value, compressing it when forced or when its JSON form is larger
/// than `threshold` bytes (unless compression is explicitly disabled)
pub(crate) fn encode(value: &Value, compress: Option<bool>, threshold: usize) -> Vec<u8> {
	let json = value.to_string().into_bytes();

	let should_compress = compress.unwrap_or(json.len() > threshold);

	if should_compress {
		match gzip(&json) {
			Ok(compressed) => return framed(GZIP, &compressed),
			Err(e) => warn!("failed to compress cache value, storing raw -- {e}"),
		}
	}

	framed(RAW, &json)
}

/// Decode a stored record, `None` if it is malformed in any way
pub(crate) fn decode(record: &[u8]) -> Option<Value> {
	let (marker, payload) = record.split_first()?;

	let result = match *marker {
		RAW => serde_json::from_slice(payload).ok(),
		GZIP => {
			let mut json = vec![];

			match GzDecoder::new(payload).read_to_end(&mut json) {
				Ok(_) => serde_json::from_slice(&json).ok(),
				Err(e) => {
					debug!("failed to decompress cache value -- {e}");
					None
				},
			}
		},
		_ => None,
	};

	if result.is_none() {
		debug!("discarding undecodable cache record");
	}

	result
}

fn gzip(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
	let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
	encoder.write_all(bytes)?;
	encoder.finish()
}

fn framed(marker: u8, payload: &[u8]) -> Vec<u8> {
	let mut record = Vec::with_capacity(payload.len() + 1);
	record.push(marker);
	record.extend_from_slice(payload);
	record
}
