/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Block rotation and flushing for the tree encoder (spec.md §4.7).
//!
//! Grounded in `WriteBlock`/`FlushBlocksToFiles`/`EncodeNode`/`EncodeParticle`
//! in `original_source/multiresolution-tree.cpp`. Three kinds of stream
//! share this module's plumbing:
//!
//! - one centered-minimal node-count stream per resolution level, block-
//!   rotated by `NodeIdx >> BlockBits`;
//! - a single centered-minimal stream for the resolution tree's own node
//!   counts (one block, the whole tree);
//! - `MaxHeight - BaseHeight` raw refinement-bit streams, each rotated by
//!   the `(BlockId, Level)` pair of the base-tree leaf currently feeding it,
//!   and flushed into whichever level's file that leaf belonged to.
//!
//! A block is only ever written once it has content (spec.md §4.7 "empty
//! blocks are never written"), and every level shares one archive-wide
//! `max_block_size` used to pad every level file identically (spec.md §9).

use crate::archive::LevelBlob;
use crate::bitio::{write_varint, BitWriter};
use crate::params::Params;
use crate::range_coder::encode_centered_minimal;

/// One level's in-progress tree-node stream plus that level's flushed blob.
struct LevelStream {
    blob: LevelBlob,
    curr_block_id: Option<u64>,
    bits: BitWriter,
}

impl LevelStream {
    fn new() -> Self {
        LevelStream {
            blob: LevelBlob::new(),
            curr_block_id: None,
            bits: BitWriter::new(),
        }
    }

    fn flush(&mut self, max_block_size: &mut usize) {
        if let Some(block_id) = self.curr_block_id.take() {
            let bits = std::mem::take(&mut self.bits);
            let bytes = bits.into_bytes();
            *max_block_size = (*max_block_size).max(bytes.len());
            self.blob.push_block(&bytes, block_id);
        }
    }

    fn ensure_block(&mut self, block_id: u64, max_block_size: &mut usize) {
        if self.curr_block_id != Some(block_id) {
            self.flush(max_block_size);
            self.curr_block_id = Some(block_id);
        }
    }
}

/// Rotating raw-bit refinement stream, shared across levels the way the
/// original's single `RefBlockStreams[K]` is: it belongs to whichever
/// `(level, block_id)` leaf most recently wrote into it.
struct RefStream {
    owner_level: Option<i32>,
    owner_block_id: Option<u64>,
    bits: BitWriter,
}

impl RefStream {
    fn new() -> Self {
        RefStream {
            owner_level: None,
            owner_block_id: None,
            bits: BitWriter::new(),
        }
    }
}

/// Accumulates every resolution level's tree-node and refinement streams
/// while the tree is being built, and finishes them into per-level file
/// bytes plus the shared max block size (spec.md §4.7, §4.8).
pub struct TreeWriter {
    params: Params,
    levels: Vec<LevelStream>,
    refs: Vec<RefStream>,
    max_block_size: usize,
}

impl TreeWriter {
    pub fn new(params: &Params) -> Self {
        let n_refs = (params.max_height.saturating_sub(params.base_height)) as usize;
        TreeWriter {
            params: params.clone(),
            levels: (0..params.n_levels).map(|_| LevelStream::new()).collect(),
            refs: (0..n_refs).map(|_| RefStream::new()).collect(),
            max_block_size: 0,
        }
    }

    /// `EncodeNode`: encode a base-tree node's left-child count.
    pub fn encode_node(&mut self, level: i32, node_idx: i64, left_count: u32, total: u32) {
        let block_id = (node_idx as u64) >> self.params.block_bits;
        let stream = &mut self.levels[level as usize];
        stream.ensure_block(block_id, &mut self.max_block_size);
        encode_centered_minimal(&mut stream.bits, left_count, total);
    }

    /// Flushes ref stream `k`'s pending bits (if any) into its current
    /// owner level's blob, under the owner's offset block id.
    fn flush_ref_stream(&mut self, k: usize) {
        let (owner_level, owner_block_id, bits) = {
            let stream = &mut self.refs[k];
            (
                stream.owner_level,
                stream.owner_block_id,
                std::mem::take(&mut stream.bits),
            )
        };
        let (Some(owner_level), Some(owner_block_id)) = (owner_level, owner_block_id) else {
            return;
        };
        let bytes = bits.into_bytes();
        if bytes.is_empty() {
            return;
        }
        self.max_block_size = self.max_block_size.max(bytes.len());
        let n_blocks_at_leaf = self.params.num_blocks_at_leaf(owner_level);
        let global_block_id = owner_block_id + (k as u64 + 1) * n_blocks_at_leaf;
        self.levels[owner_level as usize].blob.push_block(&bytes, global_block_id);
    }

    /// `EncodeParticle`: walk the refinement heights for one base-tree
    /// leaf, writing one bit per height into the appropriate ref stream.
    pub fn encode_particle_bit(&mut self, level: i32, node_idx: i64, k: usize, bit: bool) {
        let base_block_id = (node_idx as u64) >> self.params.block_bits;
        let new_block = self.refs[k].owner_block_id != Some(base_block_id);
        let new_level = self.refs[k].owner_level != Some(level);
        if new_block || new_level {
            self.flush_ref_stream(k);
            let stream = &mut self.refs[k];
            stream.owner_level = Some(level);
            stream.owner_block_id = Some(base_block_id);
        }
        self.refs[k].bits.write(bit as u64, 1);
    }

    /// `FlushBlocksToFiles`: flush every still-open block, and serialize
    /// each level's file (payload + padding + trailer).
    pub fn finish(mut self) -> (Vec<Vec<u8>>, usize) {
        for stream in self.levels.iter_mut() {
            stream.flush(&mut self.max_block_size);
        }
        for k in 0..self.refs.len() {
            self.flush_ref_stream(k);
        }

        let max_block_size = self.max_block_size;
        let level_bytes = self
            .levels
            .into_iter()
            .map(|l| l.blob.finish(max_block_size))
            .collect();
        (level_bytes, max_block_size)
    }
}

/// The single special block holding the resolution tree's `2*NLevels-1`
/// node counts (`EncodeRoot`/`EncodeResNode`).
pub struct ResolutionWriter {
    bits: BitWriter,
}

impl ResolutionWriter {
    pub fn new() -> Self {
        ResolutionWriter { bits: BitWriter::new() }
    }

    /// `EncodeRoot`: the tree's total particle count, written as a raw
    /// varint ahead of any centered-minimal-coded symbol.
    pub fn encode_root(&mut self, n: i64) {
        write_varint(&mut self.bits, n as u64);
    }

    /// `EncodeResNode`.
    pub fn encode_res_node(&mut self, left_count: u32, total: u32) {
        encode_centered_minimal(&mut self.bits, left_count, total);
    }

    pub fn finish(self) -> Vec<u8> {
        self.bits.into_bytes()
    }
}

impl Default for ResolutionWriter {
    fn default() -> Self {
        Self::new()
    }
}
