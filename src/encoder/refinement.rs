/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Sub-leaf particle refinement bits (spec.md §4.6), grounded in
//! `EncodeParticle` in `original_source/multiresolution-tree.cpp`.
//!
//! Once the base tree bottoms out at one particle per leaf (height ==
//! `base_height`), its exact position within that leaf's voxel is encoded
//! as a sequence of bisection bits: at each extra height, the particle's
//! bounding box is halved along the cycling axis, and a single bit records
//! which half it landed in.

use crate::encoder::block_writer::TreeWriter;
use crate::geometry::BBox;
use crate::params::Params;

pub fn encode_particle(writer: &mut TreeWriter, params: &Params, level: i32, node_idx: i64, pos: [f32; 3], mut bbox: BBox) {
    let mut d = (params.base_height % params.ndims as u32) as usize;
    let mut h = params.base_height + 1;
    while h <= params.max_height {
        let k = (h - params.base_height - 1) as usize;
        let half = (bbox.max[d] + bbox.min[d]) * 0.5;
        let left = pos[d] < half;
        writer.encode_particle_bit(level, node_idx, k, left);
        if left {
            bbox.max[d] = half;
        } else {
            bbox.min[d] = half;
        }
        d = (d + 1) % params.ndims;
        h += 1;
    }
}
