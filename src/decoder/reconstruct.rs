/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Particle reconstruction, grounded in `GenerateParticles`/
//! `GenerateParticlesPerNode`/`main`'s decode-side resolution-level loop in
//! `original_source/multiresolution-tree.cpp`.
//!
//! Reconstruction walks the same spatial tree the encoder built, but only
//! as deep as blocks were actually decoded: wherever both children of a
//! node are unresolved, its remaining particle count is fanned out over
//! its whole sub-grid by reservoir sampling instead of being placed exactly.
//! A leaf that *was* decoded down to one particle (`height == base_height`)
//! is narrowed further by consuming whatever refinement bits its stream
//! still holds, then placed uniformly at random within the bounding box
//! those bits leave.

use super::block_table::BlockTable;
use crate::geometry::{BBox, Grid, Particle, Side, SplitKind};
use crate::params::Params;
use rand::Rng;

/// Reconstructs every particle reachable from whatever has been decoded so
/// far in `table`, by walking each resolution level's own base tree from
/// its own root. Mirrors the per-level driving loop in the original's
/// decode path: level `n_levels - 1` is generated from the raw global
/// grid's "odd" half, and each subsequent, coarser level is generated from
/// the "even" half left behind by the level above it.
pub fn reconstruct_all(table: &mut BlockTable, params: &Params) -> Vec<Particle> {
    let mut rng = rand::thread_rng();
    let mut out = Vec::new();
    let global_grid = Grid::new_global(params.dims3);

    if params.n_levels <= 1 {
        generate_particles(table, params, &mut rng, 0, 0, 1, global_grid, 0, &mut out);
        return out;
    }

    let mut grid = global_grid;
    let mut d = 0usize;
    let mut level = params.n_levels - 1;
    let mut height = 0u32;
    loop {
        if level <= params.max_level {
            let right_grid = grid.split(d, SplitKind::Resolution, Side::Right);
            generate_particles(table, params, &mut rng, level, height + 1, 1, right_grid, (d + 1) % params.ndims, &mut out);
        }
        grid = grid.split(d, SplitKind::Resolution, Side::Left);
        d = (d + 1) % params.ndims;
        level -= 1;
        height += 1;
        if level == 0 {
            generate_particles(table, params, &mut rng, 0, height, 1, grid, d, &mut out);
            break;
        }
    }
    out
}

/// `GenerateParticles`: recursively fill `out` with `grid`'s share of
/// `node_idx`'s particles, returning how many were actually placed (`0` if
/// the node was never decoded). Above `base_height` this descends the
/// spatial tree exactly; at `base_height` it hands off to leaf refinement.
#[allow(clippy::too_many_arguments)]
fn generate_particles(
    table: &mut BlockTable,
    params: &Params,
    rng: &mut impl Rng,
    level: i32,
    height: u32,
    node_idx: i64,
    grid: Grid,
    d: usize,
    out: &mut Vec<Particle>,
) -> i64 {
    let n = match table.get_node(level, node_idx) {
        Some(n) if n > 0 => n,
        _ => return 0,
    };

    if height == params.base_height {
        generate_leaf_particle(table, params, rng, level, node_idx, &grid, out);
        return n;
    }

    if n <= params.max_particle_subsampling {
        generate_particles_per_node(params, rng, n, &grid, out);
        return n;
    }

    let left_grid = grid.split(d, SplitKind::Spatial, Side::Left);
    let right_grid = grid.split(d, SplitKind::Spatial, Side::Right);
    let next_d = (d + 1) % params.ndims;

    let left_n = generate_particles(table, params, rng, level, height + 1, node_idx * 2, left_grid, next_d, out);
    let right_n = generate_particles(table, params, rng, level, height + 1, node_idx * 2 + 1, right_grid, next_d, out);

    if left_n == 0 && right_n == 0 {
        generate_particles_per_node(params, rng, n, &grid, out);
    } else if right_n == 0 {
        generate_particles_per_node(params, rng, n - left_n, &right_grid, out);
    } else if left_n == 0 {
        generate_particles_per_node(params, rng, n - right_n, &left_grid, out);
    }
    n
}

/// One already-isolated base-tree leaf (`n == 1` by construction): narrow
/// its voxel-wide bounding box by whatever refinement bits are available,
/// then place a single particle uniformly inside whatever is left.
fn generate_leaf_particle(
    table: &mut BlockTable,
    params: &Params,
    rng: &mut impl Rng,
    level: i32,
    node_idx: i64,
    grid: &Grid,
    out: &mut Vec<Particle>,
) {
    let w3 = params.voxel_size();
    let mut bbox = BBox {
        min: std::array::from_fn(|dd| params.bbox.min[dd] + grid.from3[dd] * w3[dd]),
        max: std::array::from_fn(|dd| params.bbox.min[dd] + (grid.from3[dd] + grid.dims3[dd]) * w3[dd]),
    };

    let n_nodes_at_leaf = params.num_nodes_at_leaf(level) as i64;
    let mut d = (params.base_height % params.ndims as u32) as usize;
    for k in 0..(params.max_height.saturating_sub(params.base_height)) {
        let ref_node_idx = node_idx + (k as i64 + 1) * n_nodes_at_leaf;
        let Some(bit) = table.get_ref_bit(level, ref_node_idx) else {
            break;
        };
        let half = (bbox.max[d] + bbox.min[d]) * 0.5;
        if bit {
            bbox.max[d] = half;
        } else {
            bbox.min[d] = half;
        }
        d = (d + 1) % params.ndims;
    }

    out.push(generate_one_particle(rng, &bbox));
}

/// `GenerateParticlesPerNode`: place `n` particles among `grid`'s voxels by
/// Algorithm R reservoir sampling over the voxel scan order (x fastest, z
/// slowest), each particle landing uniformly at random inside whichever
/// single base-resolution voxel its reservoir slot picked.
fn generate_particles_per_node(params: &Params, rng: &mut impl Rng, n: i64, grid: &Grid, out: &mut Vec<Particle>) {
    if n <= 0 {
        return;
    }
    let n = n as usize;
    let w3 = params.voxel_size();
    let (dx, dy, dz) = (grid.dims3[0] as i64, grid.dims3[1] as i64, grid.dims3[2] as i64);

    let mut reservoir: Vec<[f32; 3]> = Vec::with_capacity(n);
    let mut seen: i64 = 0;
    for z in 0..dz {
        for y in 0..dy {
            for x in 0..dx {
                let point = [
                    grid.from3[0] + grid.stride3[0] * x as f32,
                    grid.from3[1] + grid.stride3[1] * y as f32,
                    grid.from3[2] + grid.stride3[2] * z as f32,
                ];
                if (seen as usize) < n {
                    reservoir.push(point);
                } else {
                    let j = rng.gen_range(0..=seen);
                    if (j as usize) < n {
                        reservoir[j as usize] = point;
                    }
                }
                seen += 1;
            }
        }
    }

    for p in reservoir {
        let bbox = BBox {
            min: std::array::from_fn(|d| params.bbox.min[d] + p[d] * w3[d]),
            max: std::array::from_fn(|d| params.bbox.min[d] + (p[d] + 1.0) * w3[d]),
        };
        out.push(generate_one_particle(rng, &bbox));
    }
}

fn generate_one_particle(rng: &mut impl Rng, bbox: &BBox) -> Particle {
    let pos = std::array::from_fn(|d| {
        let t: f32 = rng.gen();
        bbox.min[d] + (bbox.max[d] - bbox.min[d]) * t
    });
    Particle::new(pos)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::bitio::{write_varint, BitWriter};
    use crate::geometry::BBox;
    use crate::range_coder::encode_centered_minimal;

    fn test_params(base_height: u32, max_height: u32) -> Params {
        Params {
            name: "t".into(),
            ndims: 3,
            n_particles: 8,
            log_dims3: [3, 0, 0],
            dims3: [8.0, 1.0, 1.0],
            bbox: BBox {
                min: [0.0; 3],
                max: [8.0, 1.0, 1.0],
            },
            base_height,
            max_height,
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
    fn undecoded_subtree_fans_out_by_reservoir_sampling() {
        let params = test_params(3, 3);
        let mut table = BlockTable::new(&params);

        let mut res_bits = BitWriter::new();
        write_varint(&mut res_bits, 6);
        table.decode_res_block(&res_bits.into_bytes());

        // only block 0 (depths 0..2) is decoded; the depth-3 leaf block
        // (block 1) never is, so every node bottoms out unresolved and its
        // count is reservoir-sampled over its own sub-grid.
        let mut bits = BitWriter::new();
        encode_centered_minimal(&mut bits, 3, 6);
        table.decode_block(0, 0, &bits.into_bytes());

        let particles = reconstruct_all(&mut table, &params);
        assert_eq!(particles.len(), 6);
        for p in &particles {
            assert!(params.bbox.contains(p, 1e-4));
        }
    }

    #[test]
    fn fully_resolved_leaf_places_one_particle_per_voxel() {
        let mut params = test_params(3, 3);
        params.max_particle_subsampling = 0; // force full descent to leaves
        let mut table = BlockTable::new(&params);

        let mut res_bits = BitWriter::new();
        write_varint(&mut res_bits, 8);
        table.decode_res_block(&res_bits.into_bytes());

        // fully balanced tree: every node splits 50/50 down to 8 singleton
        // leaves at depth 3 (indices 8..15). With `block_bits == base_height
        // == 3`, block 0 only covers indices 2..7 (parents 1,2,3 — depths
        // 0 and 1); the leaf values themselves live in block 1 (indices
        // 8..15, parents 4..7), so both blocks must be decoded to reach them.
        let mut block0_bits = BitWriter::new();
        for m in [8u32, 4, 4] {
            encode_centered_minimal(&mut block0_bits, m / 2, m);
        }
        table.decode_block(0, 0, &block0_bits.into_bytes());

        let mut block1_bits = BitWriter::new();
        for m in [2u32, 2, 2, 2] {
            encode_centered_minimal(&mut block1_bits, m / 2, m);
        }
        table.decode_block(0, 1, &block1_bits.into_bytes());

        let particles = reconstruct_all(&mut table, &params);
        assert_eq!(particles.len(), 8);
    }
}
