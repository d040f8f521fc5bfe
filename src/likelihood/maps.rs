//! Nucleotide ambiguity maps, transcribed from the reference `pll_map_nt` /
//! `pll_map_validjc69` tables: each byte maps to a 4-bit state set (bit 0 =
//! A, bit 1 = C, bit 2 = G, bit 3 = T/U); 0 means "not a nucleotide
//! character".

/// `NT_MAP[byte]` is the 4-bit ambiguity code for `byte`, or `0` if `byte` is
/// not a recognized nucleotide character (upper- or lower-case).
pub const NT_MAP: [u8; 256] = {
    let mut map = [0u8; 256];
    map[b'-' as usize] = 15;
    map[b'?' as usize] = 15;

    let codes: [(u8, u8); 15] = [
        (b'A', 1),
        (b'C', 2),
        (b'M', 3),
        (b'G', 4),
        (b'R', 5),
        (b'S', 6),
        (b'V', 7),
        (b'T', 8),
        (b'U', 8),
        (b'W', 9),
        (b'Y', 10),
        (b'H', 11),
        (b'K', 12),
        (b'D', 13),
        (b'B', 14),
    ];
    let mut i = 0;
    while i < codes.len() {
        let (upper, code) = codes[i];
        map[upper as usize] = code;
        map[(upper + 32) as usize] = code; // lowercase
        i += 1;
    }
    map[b'N' as usize] = 15;
    map[b'n' as usize] = 15;
    map[b'X' as usize] = 15;
    map[b'x' as usize] = 15;
    map
};

/// `VALID_JC69[code]` is true iff a site with that 4-bit ambiguity code may
/// participate when JC69-valid-only compression has been requested: a single
/// unambiguous state (A, C, G or T) or the fully-ambiguous gap state.
pub const VALID_JC69: [bool; 16] = [
    false, true, true, false, true, false, false, false, true, false, false, false, false, false,
    false, true,
];

/// Decode a 4-bit ambiguity code into the set of compatible states (0=A,
/// 1=C, 2=G, 3=T), used to expand a tip character into a partial-likelihood
/// vector.
pub fn compatible_states(code: u8) -> [bool; 4] {
    [
        code & 1 != 0,
        code & 2 != 0,
        code & 4 != 0,
        code & 8 != 0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unambiguous_bases_map_to_single_bit_codes() {
        assert_eq!(NT_MAP[b'A' as usize], 1);
        assert_eq!(NT_MAP[b'C' as usize], 2);
        assert_eq!(NT_MAP[b'G' as usize], 4);
        assert_eq!(NT_MAP[b'T' as usize], 8);
        assert_eq!(NT_MAP[b'a' as usize], 1);
    }

    #[test]
    fn gap_and_n_are_fully_ambiguous() {
        assert_eq!(NT_MAP[b'-' as usize], 15);
        assert_eq!(NT_MAP[b'N' as usize], 15);
        assert_eq!(NT_MAP[b'?' as usize], 15);
    }

    #[test]
    fn non_nucleotide_bytes_map_to_zero() {
        assert_eq!(NT_MAP[b'J' as usize], 0);
        assert_eq!(NT_MAP[b'0' as usize], 0);
    }

    #[test]
    fn valid_jc69_excludes_ambiguity_codes() {
        assert!(VALID_JC69[1]); // A
        assert!(VALID_JC69[15]); // gap
        assert!(!VALID_JC69[5]); // R (A or G)
    }

    #[test]
    fn compatible_states_decodes_bitset() {
        assert_eq!(compatible_states(1), [true, false, false, false]);
        assert_eq!(compatible_states(15), [true, true, true, true]);
        assert_eq!(compatible_states(5), [true, false, true, false]);
    }
}
