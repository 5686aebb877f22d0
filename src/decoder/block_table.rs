/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Lazily-decoded block storage (spec.md §4.8), grounded in
//! `DecodeNode`/`DecodeResBlock`/`DecodeBlock`/`DecodeRefBlock`/`GetNode`/
//! `GetRefNode` in `original_source/multiresolution-tree.cpp`.
//!
//! A base-tree block and a refinement block share one per-level, per-
//! block-id table exactly as the original's single `block_table` does:
//! the two kinds of block id never collide (refinement block ids are
//! offset by `(K + 1) * NUM_BLOCKS_AT_LEAF(Level)`), so one lookup table
//! per level suffices for both.

use crate::bitio::{read_varint, BitReader};
use crate::params::Params;
use crate::range_coder::decode_centered_minimal;

/// A decoded block: either a base-tree node-count block, or a raw
/// refinement-bit block read sequentially by [`BlockTable::get_ref_bit`].
enum BlockEntry {
    Nodes(Vec<i64>),
    RefBits { bytes: Vec<u8>, bit_pos: usize },
}

pub struct BlockTable {
    params: Params,
    res_nodes: Option<Vec<i64>>,
    /// `[level][block_id]`; block ids for the base tree and for refinement
    /// blocks share this same per-level index space.
    blocks: Vec<Vec<Option<BlockEntry>>>,
}

fn read_bit_at(bytes: &[u8], bit_pos: usize) -> bool {
    let byte = bytes.get(bit_pos / 8).copied().unwrap_or(0);
    (byte >> (bit_pos % 8)) & 1 != 0
}

impl BlockTable {
    pub fn new(params: &Params) -> Self {
        BlockTable {
            params: params.clone(),
            res_nodes: None,
            blocks: vec![Vec::new(); params.n_levels as usize],
        }
    }

    fn ensure_capacity(&mut self, level: i32, block_id: u64) {
        let level_blocks = &mut self.blocks[level as usize];
        if level_blocks.len() as u64 <= block_id {
            level_blocks.resize_with((block_id as usize) * 3 / 2 + 1, || None);
        }
    }

    /// `DecodeResBlock`: decode the resolution tree's node counts from its
    /// one block.
    pub fn decode_res_block(&mut self, bytes: &[u8]) {
        let n_nodes = (self.params.n_levels * 2 - 1) as usize;
        let mut nodes = vec![0i64; n_nodes];
        let mut r = BitReader::new(bytes);
        nodes[0] = read_varint(&mut r) as i64;
        let mut i = 2usize;
        while i < n_nodes {
            let parent = Params::res_parent(i as i64) as usize;
            let m = nodes[parent];
            let left = decode_centered_minimal(&mut r, m.max(0) as u32);
            nodes[i] = left as i64;
            nodes[i - 1] = m - left as i64;
            i += 2;
        }
        self.res_nodes = Some(nodes);
    }

    pub fn res_node(&self, idx: usize) -> Option<i64> {
        self.res_nodes.as_ref().map(|n| n[idx])
    }

    /// `DecodeBlock`: decode one base-tree block's node counts, reading the
    /// implicit root (node 1, for block 0) from the resolution tree.
    pub fn decode_block(&mut self, level: i32, block_id: u64, bytes: &[u8]) {
        let block_bits = self.params.block_bits;
        let n_nodes = 1usize << block_bits;
        let mut nodes = vec![0i64; n_nodes];
        let first_node_idx = (block_id << block_bits).max(2);
        let last_node_idx = (block_id + 1) << block_bits;

        if block_id == 0 {
            let res_idx = self.params.level_to_node(level) as usize;
            nodes[1] = self.res_nodes.as_ref().expect("resolution tree decoded first")[res_idx];
        }

        let mut r = BitReader::new(bytes);
        let mask = (1u64 << block_bits) - 1;
        let mut k = first_node_idx;
        while k < last_node_idx {
            let i = (k & mask) as usize;
            let j = k / 2;
            let j_block = j >> block_bits;
            let j_idx = (j & mask) as usize;
            let m = if j_block == block_id {
                nodes[j_idx]
            } else {
                match self.blocks[level as usize].get(j_block as usize) {
                    Some(Some(BlockEntry::Nodes(v))) => v[j_idx],
                    _ => 0,
                }
            };
            if m > 0 {
                let left = decode_centered_minimal(&mut r, m as u32);
                nodes[i] = left as i64;
                nodes[i + 1] = m - left as i64;
            }
            k += 2;
        }

        self.ensure_capacity(level, block_id);
        self.blocks[level as usize][block_id as usize] = Some(BlockEntry::Nodes(nodes));
    }

    /// `DecodeRefBlock`: wrap a refinement block's raw bytes for
    /// sequential per-particle bit reads.
    pub fn decode_ref_block(&mut self, level: i32, block_id: u64, bytes: &[u8]) {
        self.ensure_capacity(level, block_id);
        self.blocks[level as usize][block_id as usize] = Some(BlockEntry::RefBits {
            bytes: bytes.to_vec(),
            bit_pos: 0,
        });
    }

    /// `GetNode`: the decoded left-child count at `node_idx`, if its block
    /// has been decoded yet.
    pub fn get_node(&self, level: i32, node_idx: i64) -> Option<i64> {
        let block_id = (node_idx as u64) >> self.params.block_bits;
        let mask = (1u64 << self.params.block_bits) - 1;
        match self.blocks[level as usize].get(block_id as usize)? {
            Some(BlockEntry::Nodes(v)) => Some(v[(node_idx as u64 & mask) as usize]),
            _ => None,
        }
    }

    /// `GetRefNode`: the next refinement bit for `node_idx`'s owning
    /// block, if that block has been loaded yet. Bits are consumed in the
    /// same sequential order [`encoder::block_writer::TreeWriter`] wrote
    /// them in.
    pub fn get_ref_bit(&mut self, level: i32, node_idx: i64) -> Option<bool> {
        let block_id = (node_idx as u64) >> self.params.block_bits;
        match self.blocks[level as usize].get_mut(block_id as usize)? {
            Some(BlockEntry::RefBits { bytes, bit_pos }) => {
                if bytes.is_empty() {
                    return None;
                }
                let bit = read_bit_at(bytes, *bit_pos);
                *bit_pos += 1;
                Some(bit)
            }
            _ => None,
        }
    }

    pub fn is_block_decoded(&self, level: i32, block_id: u64) -> bool {
        matches!(self.blocks[level as usize].get(block_id as usize), Some(Some(_)))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bitio::BitWriter;
    use crate::geometry::BBox;
    use crate::range_coder::encode_centered_minimal;

    fn test_params() -> Params {
        Params {
            name: "t".into(),
            ndims: 3,
            n_particles: 8,
            log_dims3: [1, 1, 1],
            dims3: [2.0, 2.0, 2.0],
            bbox: BBox {
                min: [0.0; 3],
                max: [1.0; 3],
            },
            base_height: 3,
            max_height: 3,
            n_levels: 1,
            block_bits: 3,
            accuracy: 0.0,
            version: (1, 0),
            max_level: 0,
            max_particle_subsampling: 1,
            max_n_bytes: u64::MAX,
            max_n_blocks: u64::MAX,
        }
    }

    #[test]
    fn decode_block_reads_implicit_root_from_resolution_tree() {
        let params = test_params();
        let mut table = BlockTable::new(&params);

        // one-level archive: resolution tree is a single node holding N=8
        let mut res_bits = BitWriter::new();
        crate::bitio::write_varint(&mut res_bits, 8);
        let res_bytes = res_bits.into_bytes();
        table.decode_res_block(&res_bytes);
        assert_eq!(table.res_node(0), Some(8));

        // block 0 of level 0: node 1 = 8 (implicit), encode node 2's left count = 3
        let mut bits = BitWriter::new();
        encode_centered_minimal(&mut bits, 3, 8);
        let bytes = bits.into_bytes();

        table.decode_block(0, 0, &bytes);
        assert_eq!(table.get_node(0, 1), Some(8));
        assert_eq!(table.get_node(0, 2), Some(3));
        assert_eq!(table.get_node(0, 3), Some(5));
    }

    #[test]
    fn ref_bits_read_back_sequentially() {
        let params = test_params();
        let mut table = BlockTable::new(&params);

        table.decode_ref_block(0, 0, &[0b0000_0101]); // bits: 1,0,1,0,...
        assert_eq!(table.get_ref_bit(0, 0), Some(true));
        assert_eq!(table.get_ref_bit(0, 0), Some(false));
        assert_eq!(table.get_ref_bit(0, 0), Some(true));
    }
}
