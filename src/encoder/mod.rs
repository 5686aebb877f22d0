/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Top-level encode entry point (spec.md §4.5-§4.7).

pub mod block_writer;
pub mod refinement;
pub mod tree;

use crate::geometry::{BBox, Particle};
use crate::params::Params;
use block_writer::{ResolutionWriter, TreeWriter};

/// Everything produced by a full encode: one resolution-tree file, one
/// file per resolution level, and the shared max block size every level
/// file was padded to (spec.md §4.7-§4.8).
pub struct EncodedArchive {
    pub resolution_bytes: Vec<u8>,
    pub level_bytes: Vec<Vec<u8>>,
    pub max_block_size: usize,
}

/// `ComputeGrid`: recursive axis-cycling median bisection that determines
/// a balanced implicit grid's per-axis log2 depth from the particles'
/// actual spatial distribution.
pub fn compute_grid(particles: &mut [Particle], bbox: BBox, d: usize, ndims: usize) -> [u32; 3] {
    debug_assert!(!particles.is_empty());
    if particles.len() == 1 {
        return [0, 0, 0];
    }
    let middle = (bbox.min[d] + bbox.max[d]) * 0.5;
    let mid = {
        let mut i = 0;
        let mut j = particles.len();
        while i < j {
            if particles[i].pos[d] >= middle {
                j -= 1;
                particles.swap(i, j);
            } else {
                i += 1;
            }
        }
        i
    };

    let mut log_dims_left = [0u32; 3];
    log_dims_left[d] = 1;
    let mut log_dims_right = [0u32; 3];
    log_dims_right[d] = 1;

    if mid >= 2 {
        let mut left_bbox = bbox;
        left_bbox.max[d] = middle;
        let mut sub = compute_grid(&mut particles[..mid], left_bbox, (d + 1) % ndims, ndims);
        sub[d] += 1;
        log_dims_left = sub;
    }
    if particles.len() - mid >= 2 {
        let mut right_bbox = bbox;
        right_bbox.min[d] = middle;
        let mut sub = compute_grid(&mut particles[mid..], right_bbox, (d + 1) % ndims, ndims);
        sub[d] += 1;
        log_dims_right = sub;
    }

    std::array::from_fn(|i| log_dims_left[i].max(log_dims_right[i]))
}

/// Encodes `particles` (already positioned; `params` fully populated,
/// including `bbox`/`dims3`/`base_height`/`max_height`) into an
/// [`EncodedArchive`].
pub fn encode(particles: &mut [Particle], params: &Params) -> EncodedArchive {
    let mut tree_writer = TreeWriter::new(params);
    let mut res_writer = ResolutionWriter::new();

    res_writer.encode_root(particles.len() as i64);
    tree::build_tree(particles, params, params.accuracy, &mut tree_writer, &mut res_writer);

    let resolution_bytes = res_writer.finish();
    let (level_bytes, max_block_size) = tree_writer.finish();

    EncodedArchive {
        resolution_bytes,
        level_bytes,
        max_block_size,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::geometry::BBox;

    fn grid_particles(dims: [i32; 3]) -> Vec<Particle> {
        let mut out = Vec::new();
        for z in 0..dims[2] {
            for y in 0..dims[1] {
                for x in 0..dims[0] {
                    out.push(Particle::new([x as f32 + 0.5, y as f32 + 0.5, z as f32 + 0.5]));
                }
            }
        }
        out
    }

    #[test]
    fn compute_grid_recovers_cubic_dims() {
        let mut particles = grid_particles([4, 4, 4]);
        let bbox = BBox {
            min: [0.0, 0.0, 0.0],
            max: [4.0, 4.0, 4.0],
        };
        let log_dims = compute_grid(&mut particles, bbox, 0, 3);
        assert_eq!(log_dims, [2, 2, 2]);
    }
}
