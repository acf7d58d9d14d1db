//! Bit/byte slice selection from a raw payload (spec §4.2).

use bit_vec::BitVec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Endian {
    #[default]
    Big,
    Little,
}

/// Optional extraction spec attached to a mapping rule. All fields are
/// optional; `None` (the default `ExtractSpec::default()`) means "pass the
/// payload through unchanged".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExtractSpec {
    pub bit_offset: Option<usize>,
    pub bit_length: Option<usize>,
    pub byte_offset: Option<usize>,
    pub byte_length: Option<usize>,
    pub endian: Endian,
}

impl ExtractSpec {
    fn is_bit_spec(&self) -> bool {
        self.bit_offset.is_some() && self.bit_length.is_some()
    }
}

/// Extracts a sub-slice of `payload` per `spec`. Never errors: out-of-range
/// requests silently yield an empty buffer (spec §4.2, §7).
pub fn extract(payload: &[u8], spec: Option<&ExtractSpec>) -> Vec<u8> {
    let Some(spec) = spec else {
        return payload.to_vec();
    };

    if spec.is_bit_spec() {
        return extract_bits(payload, spec.bit_offset.unwrap(), spec.bit_length.unwrap());
    }

    extract_bytes(payload, spec.byte_offset.unwrap_or(0), spec.byte_length)
}

fn extract_bytes(payload: &[u8], offset: usize, length: Option<usize>) -> Vec<u8> {
    if offset >= payload.len() {
        return Vec::new();
    }
    let end = match length {
        Some(len) => (offset + len).min(payload.len()),
        None => payload.len(),
    };
    payload[offset..end].to_vec()
}

/// Extracts `bit_length` contiguous bits starting at `bit_offset`, right-aligns
/// them in a newly-allocated buffer of `ceil(bit_length / 8)` bytes, high bits
/// zero-padded. A `bit_offset` past the payload end yields an empty buffer;
/// a run that partially overruns the payload is silently truncated.
fn extract_bits(payload: &[u8], bit_offset: usize, bit_length: usize) -> Vec<u8> {
    let total_bits = payload.len() * 8;
    if bit_offset >= total_bits || bit_length == 0 {
        return Vec::new();
    }

    let available = total_bits - bit_offset;
    let take = bit_length.min(available);

    let bits = BitVec::from_bytes(payload);
    let mut collected: Vec<bool> = (bit_offset..bit_offset + take).map(|i| bits[i]).collect();

    let out_bytes = bit_length.div_ceil(8);
    let out_bits = out_bytes * 8;
    // right-align: pad high (leading) bits with zero
    let pad = out_bits - collected.len();
    let mut aligned = vec![false; pad];
    aligned.append(&mut collected);

    let mut out = BitVec::from_elem(out_bits, false);
    for (i, bit) in aligned.into_iter().enumerate() {
        out.set(i, bit);
    }
    out.to_bytes()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn no_spec_passes_through() {
        let payload = [1u8, 2, 3, 4];
        assert_eq!(extract(&payload, None), payload.to_vec());
    }

    #[test]
    fn full_slice_equals_payload() {
        // R4
        let payload = [9u8, 8, 7, 6, 5];
        let spec = ExtractSpec {
            byte_offset: Some(0),
            byte_length: Some(payload.len()),
            ..Default::default()
        };
        assert_eq!(extract(&payload, Some(&spec)), payload.to_vec());
    }

    #[test]
    fn missing_length_means_to_end() {
        let payload = [1u8, 2, 3, 4, 5];
        let spec = ExtractSpec {
            byte_offset: Some(2),
            ..Default::default()
        };
        assert_eq!(extract(&payload, Some(&spec)), vec![3, 4, 5]);
    }

    #[test]
    fn out_of_range_byte_slice_is_empty() {
        let payload = [1u8, 2, 3];
        let spec = ExtractSpec {
            byte_offset: Some(10),
            byte_length: Some(2),
            ..Default::default()
        };
        assert_eq!(extract(&payload, Some(&spec)), Vec::<u8>::new());
    }

    #[test]
    fn bit_offset_past_end_is_empty() {
        let payload = [0xFFu8];
        let spec = ExtractSpec {
            bit_offset: Some(100),
            bit_length: Some(4),
            ..Default::default()
        };
        assert_eq!(extract(&payload, Some(&spec)), Vec::<u8>::new());
    }

    #[test]
    fn bit_run_is_right_aligned_and_zero_padded() {
        // 0b1011_0000 -> take top 4 bits (1011) -> right-aligned in one byte -> 0b0000_1011
        let payload = [0b1011_0000u8];
        let spec = ExtractSpec {
            bit_offset: Some(0),
            bit_length: Some(4),
            ..Default::default()
        };
        assert_eq!(extract(&payload, Some(&spec)), vec![0b0000_1011]);
    }

    #[test]
    fn bit_run_spanning_byte_boundary() {
        // bytes: 1111_1111 0000_0000 ; take bits [4..12) -> 1111 0000 -> 0xF0
        let payload = [0xFFu8, 0x00];
        let spec = ExtractSpec {
            bit_offset: Some(4),
            bit_length: Some(8),
            ..Default::default()
        };
        assert_eq!(extract(&payload, Some(&spec)), vec![0xF0]);
    }
}
