/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! In-place particle partitioning for the two split kinds (spec.md §4.4).
//!
//! Both functions partition `particles` around axis `d` so that every
//! particle routed to the `Left` child precedes every particle routed to
//! `Right`, and return the pivot (the left child's particle count). Order
//! within each half is not preserved; only the count and the two halves'
//! membership matter to the tree encoder.

use crate::geometry::{BBox, Grid, Particle};

fn two_way_partition(particles: &mut [Particle], mut goes_right: impl FnMut(&Particle) -> bool) -> usize {
    let mut i = 0;
    let mut j = particles.len();
    while i < j {
        if goes_right(&particles[i]) {
            j -= 1;
            particles.swap(i, j);
        } else {
            i += 1;
        }
    }
    i
}

/// Splits `particles` at the spatial midpoint of the current subgrid along
/// axis `d`. A particle exactly on the boundary goes right.
pub fn partition_spatial(
    particles: &mut [Particle],
    d: usize,
    bbox: &BBox,
    voxel_size: &[f32; 3],
    grid: &Grid,
) -> usize {
    let s = if grid.dims3[d] > 1.5 { grid.stride3[d] } else { 1.0 };
    let threshold = bbox.min[d] + voxel_size[d] * (grid.from3[d] + 0.5 * grid.dims3[d] * s);

    two_way_partition(particles, |p| p.pos[d] >= threshold)
}

/// Splits `particles` by the parity of their voxel bin along axis `d` at the
/// current stride: even bins (the coarser, already-visited sublattice) go
/// left, odd bins (the newly-revealed finer sublattice) go right.
pub fn partition_resolution(
    particles: &mut [Particle],
    d: usize,
    bbox: &BBox,
    voxel_size: &[f32; 3],
    grid: &Grid,
) -> usize {
    let voxel_index = |p: &Particle| -> i64 {
        let local = (p.pos[d] - bbox.min[d]) / voxel_size[d];
        let rel = (local - grid.from3[d]) / grid.stride3[d];
        rel.floor() as i64
    };

    two_way_partition(particles, |p| voxel_index(p) & 1 != 0)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::geometry::Grid;

    fn bbox_unit() -> BBox {
        BBox {
            min: [0.0; 3],
            max: [8.0; 3],
        }
    }

    #[test]
    fn spatial_partition_splits_by_midpoint() {
        let bbox = bbox_unit();
        let w = [1.0, 1.0, 1.0];
        let grid = Grid::new_global([8.0, 8.0, 8.0]);

        let mut particles: Vec<Particle> = (0..8)
            .map(|i| Particle::new([i as f32 + 0.5, 0.0, 0.0]))
            .collect();
        let pivot = partition_spatial(&mut particles, 0, &bbox, &w, &grid);

        assert_eq!(pivot, 4);
        assert!(particles[..pivot].iter().all(|p| p.pos[0] < 4.0));
        assert!(particles[pivot..].iter().all(|p| p.pos[0] >= 4.0));
    }

    #[test]
    fn resolution_partition_splits_by_parity() {
        let bbox = bbox_unit();
        let w = [1.0, 1.0, 1.0];
        let grid = Grid::new_global([8.0, 8.0, 8.0]);

        let mut particles: Vec<Particle> = (0..8)
            .map(|i| Particle::new([i as f32 + 0.5, 0.0, 0.0]))
            .collect();
        let pivot = partition_resolution(&mut particles, 0, &bbox, &w, &grid);

        assert_eq!(pivot, 4); // voxels 0,2,4,6 are even
        for p in &particles[..pivot] {
            let idx = p.pos[0].floor() as i64;
            assert_eq!(idx & 1, 0);
        }
        for p in &particles[pivot..] {
            let idx = p.pos[0].floor() as i64;
            assert_eq!(idx & 1, 1);
        }
    }

    #[test]
    fn partition_preserves_total_count_and_membership() {
        let bbox = bbox_unit();
        let w = [1.0, 1.0, 1.0];
        let grid = Grid::new_global([8.0, 8.0, 8.0]);

        let original: Vec<Particle> = (0..37)
            .map(|i| Particle::new([(i % 8) as f32 + 0.25, 0.0, 0.0]))
            .collect();
        let mut particles = original.clone();
        let pivot = partition_spatial(&mut particles, 0, &bbox, &w, &grid);

        assert_eq!(particles.len(), original.len());
        assert!(pivot <= particles.len());

        let mut sorted_before = original.iter().map(|p| p.pos[0]).collect::<Vec<_>>();
        let mut sorted_after = particles.iter().map(|p| p.pos[0]).collect::<Vec<_>>();
        sorted_before.sort_by(|a, b| a.partial_cmp(b).unwrap());
        sorted_after.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(sorted_before, sorted_after);
    }
}
