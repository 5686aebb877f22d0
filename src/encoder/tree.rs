/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Breadth-first tree construction (spec.md §4.5), grounded in
//! `BuildTreeInner` in `original_source/multiresolution-tree.cpp`.
//!
//! A single FIFO queue spans the whole build, across every resolution
//! level at once: a resolution split's left child keeps propagating
//! resolution splits for as long as `level > 1`, while every right child
//! (and every child once `level <= 1`) switches permanently to spatial
//! splits. Interleaving levels in one queue like this is what makes the
//! per-level write order the decoder's index-based block reader expects
//! (see `decoder::block_table`): within any one level, node indices only
//! ever increase as the queue drains.
//!
//! The original's `q_item` also carries `TreeIdx`/`ResIdx`/`ParIdx` fields;
//! they are computed and propagated but never read back by `BuildTreeInner`
//! itself (leftover plumbing for a removed debug-print routine), so this
//! port drops them. Likewise, `EncodeNode`'s `Q.Level - (Q.SplitType ==
//! ResolutionSplit)` level argument always evaluates to `Q.Level` at its
//! one call site (reachable only when `SplitType == SpatialSplit`), so it
//! is written here as plain `q.level`.

use crate::encoder::block_writer::{ResolutionWriter, TreeWriter};
use crate::encoder::refinement::encode_particle;
use crate::geometry::{BBox, Grid, Particle, Side, SplitKind};
use crate::params::Params;
use crate::partition::{partition_resolution, partition_spatial};
use std::collections::VecDeque;

struct QItem {
    begin: usize,
    end: usize,
    node_idx: i64,
    grid: Grid,
    d: usize,
    level: i32,
    height: u32,
    split_type: SplitKind,
}

/// Builds the full tree (resolution splits then per-level spatial splits,
/// then leaf refinement bits) over `particles`, partitioning them in place.
pub fn build_tree(
    particles: &mut [Particle],
    params: &Params,
    accuracy: f32,
    tree_writer: &mut TreeWriter,
    res_writer: &mut ResolutionWriter,
) {
    let w3 = params.voxel_size();
    let global_grid = Grid::new_global(params.dims3);

    let mut queue: VecDeque<QItem> = VecDeque::new();
    queue.push_back(QItem {
        begin: 0,
        end: particles.len(),
        node_idx: 1,
        grid: global_grid,
        d: 0,
        level: params.n_levels - 1,
        height: 0,
        split_type: if params.n_levels > 1 {
            SplitKind::Resolution
        } else {
            SplitKind::Spatial
        },
    });

    while let Some(q) = queue.pop_front() {
        debug_assert!(q.height <= params.max_height);
        let n = (q.end - q.begin) as i64;
        let error3 = [
            w3[0] * q.grid.dims3[0] / n as f32,
            w3[1] * q.grid.dims3[1] / n as f32,
            w3[2] * q.grid.dims3[2] / n as f32,
        ];
        let mut stop = error3[0] <= accuracy && error3[1] <= accuracy;
        if params.ndims > 2 {
            stop = stop && error3[2] <= accuracy;
        }
        if stop {
            continue;
        }

        let is_res = q.split_type == SplitKind::Resolution;
        let slice = &mut particles[q.begin..q.end];
        let mid_local = if is_res {
            partition_resolution(slice, q.d, &params.bbox, &w3, &q.grid)
        } else {
            partition_spatial(slice, q.d, &params.bbox, &w3, &q.grid)
        };
        let mid = q.begin + mid_local;

        if q.height < params.base_height {
            let left_count = (mid - q.begin) as u32;
            let total = (q.end - q.begin) as u32;
            if is_res {
                res_writer.encode_res_node(left_count, total);
            } else {
                tree_writer.encode_node(q.level, q.node_idx * 2, left_count, total);
            }

            if q.begin < mid {
                queue.push_back(QItem {
                    begin: q.begin,
                    end: mid,
                    node_idx: if is_res { q.node_idx } else { q.node_idx * 2 },
                    grid: q.grid.split(q.d, q.split_type, Side::Left),
                    d: (q.d + 1) % params.ndims,
                    level: if is_res { q.level - 1 } else { q.level },
                    height: q.height + 1,
                    split_type: if n > 1 && is_res && q.level > 1 {
                        SplitKind::Resolution
                    } else {
                        SplitKind::Spatial
                    },
                });
            }
            if mid < q.end {
                queue.push_back(QItem {
                    begin: mid,
                    end: q.end,
                    node_idx: if is_res { q.node_idx } else { q.node_idx * 2 + 1 },
                    grid: q.grid.split(q.d, q.split_type, Side::Right),
                    d: (q.d + 1) % params.ndims,
                    level: q.level,
                    height: q.height + 1,
                    split_type: SplitKind::Spatial,
                });
            }
        } else {
            debug_assert_eq!(n, 1);
            let bbox = BBox {
                min: std::array::from_fn(|d| params.bbox.min[d] + q.grid.from3[d] * w3[d]),
                max: std::array::from_fn(|d| params.bbox.min[d] + (q.grid.from3[d] + q.grid.dims3[d]) * w3[d]),
            };
            encode_particle(tree_writer, params, q.level, q.node_idx, particles[q.begin].pos, bbox);
        }
    }
}
