//! Derived-state encoding: a mutation row's derived state is the
//! concatenation of every mutation id present at that genome/position
//! (spec §4.5), stored as tskit's opaque `&[u8]` payload. We pack ids as
//! little-endian `u64`s rather than a textual list so the byte length is
//! fixed-stride and cheap to split back apart.

const ID_WIDTH: usize = std::mem::size_of::<u64>();

/// Concatenate mutation ids (and any fixed-substitution ids at the same
/// position) into the byte buffer tskit stores as a mutation's derived
/// state.
pub fn encode_derived_state(ids: &[u64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ids.len() * ID_WIDTH);
    for id in ids {
        buf.extend_from_slice(&id.to_le_bytes());
    }
    buf
}

/// Inverse of [`encode_derived_state`]. Returns an empty vector for the
/// ancestral (root) state, which is the empty byte string by
/// convention.
pub fn decode_derived_state(bytes: &[u8]) -> Vec<u64> {
    bytes
        .chunks_exact(ID_WIDTH)
        .map(|chunk| {
            let mut arr = [0u8; ID_WIDTH];
            arr.copy_from_slice(chunk);
            u64::from_le_bytes(arr)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_empty_and_populated_states() {
        assert_eq!(decode_derived_state(&encode_derived_state(&[])), Vec::<u64>::new());
        let ids = vec![1u64, 7, 9001];
        assert_eq!(decode_derived_state(&encode_derived_state(&ids)), ids);
    }

    #[test]
    fn encoding_is_order_preserving() {
        let encoded = encode_derived_state(&[3, 1, 2]);
        assert_eq!(decode_derived_state(&encoded), vec![3, 1, 2]);
    }
}
