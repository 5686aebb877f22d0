/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Priority-driven block scheduling, grounded in `RefineByLevel`/
//! `RefineByError`/`block_data`/`block_priority`/`NodeVolume` in
//! `original_source/multiresolution-tree.cpp`.
//!
//! A single heap holds every block still worth decoding. Each `step` pops
//! the best candidate, decodes it through a [`BlockTable`], and pushes
//! whichever children that decode newly made worth considering: a fresh
//! resolution level, the two halves of a base-tree block, or the next
//! refinement height of a leaf. The loop in [`super::Decoder`] drives this
//! until the heap runs dry or a byte/block budget trips.

use super::block_table::BlockTable;
use super::BlockSource;
use crate::params::Params;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Which quantity ties are broken on, and in which direction work is
/// prioritized: `ByLevel` always prefers the lowest (level, blockId) pair
/// (closest to a breadth-first decode); `ByError` prefers whichever
/// candidate's estimated reconstruction error is currently largest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    ByLevel,
    ByError,
}

/// One still-undecoded candidate, ordered so a plain max-`BinaryHeap` pops
/// the most valuable entry first under either strategy: primarily by
/// `error` ascending (0.0 for every entry under `ByLevel`, so all ties fall
/// through to the tiebreak), then by the lowest `level`, then by the lowest
/// `block_id` — mirroring the original's `operator<` on `block_data` and
/// `block_priority`, both of which compare "larger" as "less interesting".
#[derive(Debug, Clone, Copy)]
struct Entry {
    level: i32,
    block_id: u64,
    height: u32,
    error: f32,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.level == other.level && self.block_id == other.block_id && self.error == other.error
    }
}
impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.error
            .partial_cmp(&other.error)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.level.cmp(&self.level))
            .then_with(|| other.block_id.cmp(&self.block_id))
    }
}

/// `NodeVolume`: the physical volume one node occupies at `height`.
fn node_volume(params: &Params, height: u32) -> f32 {
    let size = params.bbox.size();
    let volume = size[0] * size[1] * size[2];
    volume * 2f32.powi(-(height as i32))
}

/// A resolution level high enough that the real tree never reaches it;
/// used as the initial, always-first-popped seed entry.
fn resolution_entry(params: &Params) -> Entry {
    Entry {
        level: params.n_levels,
        block_id: 0,
        height: 0,
        error: f32::INFINITY,
    }
}

pub struct RefinementScheduler {
    heap: BinaryHeap<Entry>,
    bytes_read: u64,
    blocks_read: u64,
}

impl RefinementScheduler {
    pub fn new(params: &Params) -> Self {
        let mut heap = BinaryHeap::new();
        heap.push(resolution_entry(params));
        RefinementScheduler {
            heap,
            bytes_read: 0,
            blocks_read: 0,
        }
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    pub fn blocks_read(&self) -> u64 {
        self.blocks_read
    }

    pub fn is_within_budget(&self, params: &Params) -> bool {
        self.bytes_read < params.max_n_bytes && self.blocks_read < params.max_n_blocks
    }

    /// Pops and decodes one candidate, enqueuing whichever children it
    /// newly makes worth reading. Returns `false` once the heap is empty
    /// (nothing left, under any budget); a `NotFound` block is silently
    /// skipped rather than treated as an error, since a pruned subtree is
    /// simply absent from the archive.
    pub fn step(
        &mut self,
        params: &Params,
        table: &mut BlockTable,
        source: &mut dyn BlockSource,
        strategy: Strategy,
    ) -> anyhow::Result<bool> {
        loop {
            let Some(entry) = self.heap.pop() else {
                return Ok(false);
            };
            let is_resolution = entry.level == params.n_levels;

            let bytes = if is_resolution {
                source.resolution_bytes()?
            } else {
                match source.read_block(entry.level, entry.block_id, entry.height)? {
                    Some(bytes) => bytes,
                    None => continue,
                }
            };
            self.bytes_read += bytes.len() as u64;
            self.blocks_read += 1;

            if is_resolution {
                table.decode_res_block(&bytes);
            } else if entry.height <= params.base_height {
                table.decode_block(entry.level, entry.block_id, &bytes);
            } else {
                table.decode_ref_block(entry.level, entry.block_id, &bytes);
            }

            // Which children get enqueued depends on the decoded node's own
            // height, not on which decode function just ran: a block whose
            // height lands exactly on `base_height` was decoded as a regular
            // node block, but its *children* are leaves narrowed only by
            // refinement bits, so it takes the refinement branch here too.
            if is_resolution {
                self.enqueue_resolution_children(params, table, strategy);
            } else if entry.height < params.base_height {
                self.enqueue_regular_children(params, table, entry, strategy);
            } else {
                self.enqueue_refinement_child(params, entry, strategy);
            }
            return Ok(true);
        }
    }

    fn enqueue_resolution_children(&mut self, params: &Params, table: &BlockTable, strategy: Strategy) {
        let n_nodes = (params.n_levels * 2 - 1) as usize;
        for node_idx in 0..n_nodes {
            // only the odd resolution-tree indices (and the final, unpaired
            // even index) have their own level; see `level_to_node`.
            if node_idx % 2 == 0 && node_idx + 1 != n_nodes {
                continue;
            }
            let count = table.res_node(node_idx).unwrap_or(0);
            if count <= 0 {
                continue;
            }
            let level = params.n_levels - 1 - (node_idx as i32 / 2);
            let height = params.level_to_height(level);
            if height > params.max_height {
                continue;
            }
            let error = match strategy {
                Strategy::ByLevel => 0.0,
                Strategy::ByError => node_volume(params, height) / count as f32,
            };
            self.heap.push(Entry {
                level,
                block_id: 0,
                height,
                error,
            });
        }
    }

    fn enqueue_regular_children(&mut self, params: &Params, table: &BlockTable, entry: Entry, strategy: Strategy) {
        let child_height = if entry.block_id == 0 {
            entry.height + params.block_bits
        } else {
            entry.height + 1
        };
        if child_height > params.max_height || entry.level > params.max_level {
            return;
        }

        let left_block = entry.block_id * 2;
        let right_block = entry.block_id * 2 + 1;
        let n_local_nodes = 1u64 << params.block_bits;
        let vol_height = if entry.block_id == 0 {
            entry.height + params.block_bits - 1
        } else {
            entry.height
        };
        let volume = node_volume(params, vol_height);

        let (mut left_count, mut right_count) = (0i64, 0i64);
        for i in 0..n_local_nodes {
            let global = (entry.block_id << params.block_bits) + i;
            if global == 0 {
                continue;
            }
            let count = table.get_node(entry.level, global as i64).unwrap_or(0);
            if count == 0 {
                continue;
            }
            let child_block = (global * 2) >> params.block_bits;
            if child_block == entry.block_id {
                continue;
            } else if child_block == left_block {
                left_count += count;
            } else {
                right_count += count;
            }
        }

        if entry.block_id != 0 && left_count > 0 {
            let error = match strategy {
                Strategy::ByLevel => 0.0,
                Strategy::ByError => volume / left_count as f32,
            };
            self.heap.push(Entry {
                level: entry.level,
                block_id: left_block,
                height: child_height,
                error,
            });
        }
        if right_count > 0 {
            let error = match strategy {
                Strategy::ByLevel => 0.0,
                Strategy::ByError => volume / right_count as f32,
            };
            self.heap.push(Entry {
                level: entry.level,
                block_id: right_block,
                height: child_height,
                error,
            });
        }
    }

    fn enqueue_refinement_child(&mut self, params: &Params, entry: Entry, strategy: Strategy) {
        if entry.height >= params.max_height || entry.level > params.max_level {
            return;
        }
        let child_height = if entry.block_id == 0 {
            entry.height + params.block_bits
        } else {
            entry.height + 1
        };
        if child_height > params.max_height {
            return;
        }
        let n_blocks_at_leaf = params.num_blocks_at_leaf(entry.level);
        let child_block = entry.block_id + n_blocks_at_leaf;
        let error = match strategy {
            Strategy::ByLevel => 0.0,
            Strategy::ByError => entry.error * 0.5,
        };
        self.heap.push(Entry {
            level: entry.level,
            block_id: child_block,
            height: child_height,
            error,
        });
    }
}
