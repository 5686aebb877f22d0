/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Particle positions, bounding boxes, and the subgrid split operator
//! (spec.md §3, §4.3).

/// A particle position in up to 3 dimensions. Only the first `ndims`
/// components are meaningful; unused trailing components are zero.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub pos: [f32; 3],
}

impl Particle {
    pub fn new(pos: [f32; 3]) -> Self {
        Particle { pos }
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl BBox {
    pub fn from_particles(particles: &[Particle]) -> Self {
        assert!(!particles.is_empty(), "cannot bound an empty particle set");

        let mut min = particles[0].pos;
        let mut max = particles[0].pos;
        for p in &particles[1..] {
            for d in 0..3 {
                min[d] = min[d].min(p.pos[d]);
                max[d] = max[d].max(p.pos[d]);
            }
        }
        BBox { min, max }
    }

    /// per-axis extent
    pub fn size(&self) -> [f32; 3] {
        std::array::from_fn(|d| self.max[d] - self.min[d])
    }

    pub fn contains(&self, p: &Particle, eps: f32) -> bool {
        (0..3).all(|d| p.pos[d] >= self.min[d] - eps && p.pos[d] <= self.max[d] + eps)
    }
}

/// Which half a spatial/resolution split produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Whether a tree split bisects space (spatial) or interleaves even/odd
/// voxels of the current sublattice (resolution), spec.md §3-§4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitKind {
    Spatial,
    Resolution,
}

/// A sub-lattice of the global voxel grid: `{From3, Dims3, Stride3}`
/// (spec.md §3). Components are always non-negative, integer-valued
/// floats, kept as `f32` to match the partition predicates that mix grid
/// coordinates with particle positions (see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grid {
    pub from3: [f32; 3],
    pub dims3: [f32; 3],
    pub stride3: [f32; 3],
}

impl Grid {
    pub fn new_global(dims3: [f32; 3]) -> Self {
        Grid {
            from3: [0.0; 3],
            dims3,
            stride3: [1.0; 3],
        }
    }

    /// `SplitGrid(G, d, type, side)`, spec.md §4.3.
    ///
    /// Precondition: `dims3[d]` is an even integer, or equals 1 (in which
    /// case the caller must not request a split along `d` — spec.md
    /// invariant, tested in §8 property 8).
    pub fn split(&self, d: usize, kind: SplitKind, side: Side) -> Grid {
        debug_assert!(self.dims3[d] >= 2.0, "cannot split a unit-width axis");

        let mut g = *self;
        let side_f = if side == Side::Left { 0.0 } else { 1.0 };

        match kind {
            SplitKind::Spatial => {
                g.dims3[d] = self.dims3[d] / 2.0;
                g.from3[d] = self.from3[d] + side_f * self.stride3[d] * g.dims3[d];
            }
            SplitKind::Resolution => {
                g.dims3[d] = self.dims3[d] / 2.0;
                g.stride3[d] = self.stride3[d] * 2.0;
                g.from3[d] = self.from3[d] + side_f * self.stride3[d];
            }
        }
        g
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn spatial_split_bisects_dims() {
        let g = Grid::new_global([4.0, 4.0, 4.0]);
        let left = g.split(0, SplitKind::Spatial, Side::Left);
        let right = g.split(0, SplitKind::Spatial, Side::Right);
        assert_eq!(left.dims3[0], 2.0);
        assert_eq!(right.dims3[0], 2.0);
        assert_eq!(left.from3[0], 0.0);
        assert_eq!(right.from3[0], 2.0);
    }

    #[test]
    fn resolution_split_doubles_stride() {
        let g = Grid::new_global([4.0, 4.0, 4.0]);
        let even = g.split(0, SplitKind::Resolution, Side::Left);
        let odd = g.split(0, SplitKind::Resolution, Side::Right);
        assert_eq!(even.dims3[0], 2.0);
        assert_eq!(even.stride3[0], 2.0);
        assert_eq!(even.from3[0], 0.0);
        assert_eq!(odd.from3[0], 1.0);
    }

    #[test]
    fn bbox_from_particles() {
        let ps = [
            Particle::new([0.0, 1.0, 2.0]),
            Particle::new([3.0, -1.0, 2.5]),
        ];
        let bbox = BBox::from_particles(&ps);
        assert_eq!(bbox.min, [0.0, -1.0, 2.0]);
        assert_eq!(bbox.max, [3.0, 1.0, 2.5]);
    }
}
