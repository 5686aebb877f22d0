/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Integer coding for per-node left-child counts (spec.md §4.2).
//!
//! A centered-minimal (truncated binary) prefix code covers the full
//! `[0, N]` range: `floor(log2(N+1))` bits for the first `u` values, one bit
//! more for the rest. This is the only coding used for node and resolution
//! tree counts; grounded in `EncodeNode`/`EncodeResNode` in
//! `original_source/multiresolution-tree.cpp`, which drive every count
//! through the truncated-binary path regardless of its size.

use crate::bitio::{BitReader, BitWriter};
use crate::helpers::log2_floor;

/// Centered-minimal (truncated binary) encode of `value` in `[0, n]`.
pub fn encode_centered_minimal(w: &mut BitWriter, value: u32, n: u32) {
    let range = n + 1;
    if range <= 1 {
        return;
    }
    let k = log2_floor(range);
    let u = (1u32 << (k + 1)) - range;
    if value < u {
        w.write(value as u64, k);
    } else {
        w.write((value + u) as u64, k + 1);
    }
}

/// Dual of [`encode_centered_minimal`].
pub fn decode_centered_minimal(r: &mut BitReader, n: u32) -> u32 {
    let range = n + 1;
    if range <= 1 {
        return 0;
    }
    let k = log2_floor(range);
    let u = (1u32 << (k + 1)) - range;
    let prefix = r.read(k) as u32;
    if prefix < u {
        prefix
    } else {
        let extra = r.read(1) as u32;
        ((prefix << 1) | extra) - u
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn centered_minimal_roundtrip_all_values() {
        for n in [0u32, 1, 2, 3, 7, 8, 31, 32, 100, 1000] {
            for value in 0..=n {
                let mut w = BitWriter::new();
                encode_centered_minimal(&mut w, value, n);
                let bytes = w.into_bytes();
                let mut r = BitReader::new(&bytes);
                assert_eq!(decode_centered_minimal(&mut r, n), value);
            }
        }
    }

    #[test]
    fn centered_minimal_uses_fixed_width_for_power_of_two_range() {
        // n+1 == 8 is a power of two: every value takes exactly 3 bits.
        let n = 7;
        for value in 0..=n {
            let mut w = BitWriter::new();
            encode_centered_minimal(&mut w, value, n);
            assert_eq!(w.byte_len(), 0); // 3 bits, not flushed to a byte yet
            let bytes = w.into_bytes();
            assert_eq!(bytes.len(), 1);
        }
    }

    #[test]
    fn centered_minimal_sequence_straddling_large_and_small_counts_roundtrips() {
        // A single stream mixing small and large `n` is exactly what one
        // block's node-count stream looks like once the tree narrows; both
        // ends must share one coding scheme to stay desynchronization-free.
        let ns = [3u32, 200, 31, 32, 1_000_000, 0, 16];
        let values = [2u32, 150, 0, 17, 999_999, 0, 9];

        let mut w = BitWriter::new();
        for (&n, &v) in ns.iter().zip(values.iter()) {
            encode_centered_minimal(&mut w, v, n);
        }
        let bytes = w.into_bytes();

        let mut r = BitReader::new(&bytes);
        for (&n, &expected) in ns.iter().zip(values.iter()) {
            assert_eq!(decode_centered_minimal(&mut r, n), expected);
        }
    }
}
