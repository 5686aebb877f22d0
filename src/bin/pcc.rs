/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! CLI front-end: `--action encode|decode|error` (spec.md §6), grounded in
//! `main()`'s argument handling in `original_source/multiresolution-tree.cpp`.

use log::info;
use particle_lod_codec::decoder::{decode, FileBlockSource};
use particle_lod_codec::decoder::scheduler::Strategy;
use particle_lod_codec::encoder::{compute_grid, encode};
use particle_lod_codec::error::{err_exit_code, ExitCode};
use particle_lod_codec::geometry::BBox;
use particle_lod_codec::params::Params;
use particle_lod_codec::{sexpr, xyz};
use pico_args::Arguments;

const USAGE: &str = "Usage:\n  \
    encode: pcc --action encode --in particles.xyz --name out --ndims 3 --nlevels 4 --block 2 (--height 6|--accuracy 0.01)\n  \
    decode: pcc --action decode --in out.idx --out particles.xyz (--height 6|--accuracy 0.01) [--max_level n] [--max_num_blocks n] [--max_subsampling n]\n  \
    error:  pcc --action error --in a.xyz --out b.xyz --dims x y z";

fn run() -> anyhow::Result<()> {
    simple_logger::SimpleLogger::new().init().ok();
    let mut args = Arguments::from_env();

    let action: String = args
        .opt_value_from_str("--action")?
        .ok_or_else(|| anyhow::anyhow!("{}: missing --action\n{USAGE}", ExitCode::InvalidParameter))?;

    match action.as_str() {
        "encode" => run_encode(args),
        "decode" => run_decode(args),
        "error" => run_error(args),
        _ => err_exit_code(ExitCode::InvalidParameter, format!("unknown --action {action}\n{USAGE}")),
    }
}

fn require<T: std::str::FromStr>(args: &mut Arguments, flag: &'static str) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    args.opt_value_from_str(format!("--{flag}").as_str())
        .map_err(|e| anyhow::anyhow!("{}: --{flag}: {e}", ExitCode::InvalidParameter))?
        .ok_or_else(|| anyhow::anyhow!("{}: missing --{flag}", ExitCode::InvalidParameter))
}

fn run_encode(mut args: Arguments) -> anyhow::Result<()> {
    let name: String = require(&mut args, "name")?;
    let ndims: usize = require(&mut args, "ndims")?;
    let n_levels: i32 = require(&mut args, "nlevels")?;
    let in_file: String = require(&mut args, "in")?;
    let block_bits: u32 = require(&mut args, "block")?;

    let height: Option<u32> = args.opt_value_from_str("--height")?;
    let accuracy: Option<f32> = args.opt_value_from_str("--accuracy")?;
    if height.is_none() && accuracy.is_none() {
        return err_exit_code(ExitCode::InvalidParameter, "missing --height and --accuracy");
    }

    let mut particles = xyz::read_xyz(&in_file)?;
    info!("read {} particles from {in_file}", particles.len());
    let n_particles = particles.len() as i64;

    let mut bbox = BBox::from_particles(&particles);
    if ndims < 3 && bbox.max[2] == bbox.min[2] {
        bbox.max[2] = bbox.min[2] + 1.0;
    }

    let log_dims3 = compute_grid(&mut particles, bbox, 0, ndims);
    let base_height = log_dims3[0] + log_dims3[1] + log_dims3[2];
    let dims3 = std::array::from_fn(|d| (1u32 << log_dims3[d]) as f32);

    let mut params = Params {
        name: name.clone(),
        ndims,
        n_particles,
        log_dims3,
        dims3,
        bbox,
        base_height,
        max_height: base_height,
        n_levels,
        block_bits,
        accuracy: accuracy.unwrap_or(0.0),
        version: (1, 0),
        max_level: n_levels - 1,
        max_particle_subsampling: 1,
        max_n_bytes: u64::MAX,
        max_n_blocks: u64::MAX,
    };
    params.max_height = match height {
        Some(h) => h.max(base_height),
        None => params.height_for_accuracy(params.accuracy).max(base_height),
    };

    info!(
        "bbox = {:?}-{:?}, log_dims3 = {:?}, base_height = {base_height}, max_height = {}",
        params.bbox.min, params.bbox.max, params.log_dims3, params.max_height
    );

    let archive = encode(&mut particles, &params);
    for (level, bytes) in archive.level_bytes.iter().enumerate() {
        std::fs::write(format!("{name}-{level}.bin"), bytes)
            .map_err(|e| anyhow::anyhow!("{}: failed to write level {level} file: {e}", ExitCode::IoError))?;
    }
    std::fs::write(format!("{name}-{n_levels}.bin"), &archive.resolution_bytes)
        .map_err(|e| anyhow::anyhow!("{}: failed to write resolution file: {e}", ExitCode::IoError))?;
    sexpr::write_idx_file(&params, format!("{name}.idx"))?;

    info!("encoded {n_particles} particles into {n_levels} level file(s), max block size = {}", archive.max_block_size);
    Ok(())
}

fn run_decode(mut args: Arguments) -> anyhow::Result<()> {
    let in_file: String = require(&mut args, "in")?;
    let out_file: String = require(&mut args, "out")?;

    let height: Option<u32> = args.opt_value_from_str("--height")?;
    let accuracy: Option<f32> = args.opt_value_from_str("--accuracy")?;
    if height.is_none() && accuracy.is_none() {
        return err_exit_code(ExitCode::InvalidParameter, "missing --height and --accuracy");
    }
    let max_level: Option<i32> = args.opt_value_from_str("--max_level")?;
    let max_num_blocks: Option<u64> = args.opt_value_from_str("--max_num_blocks")?;
    let max_subsampling: Option<i64> = args.opt_value_from_str("--max_subsampling")?;

    let mut params = Params {
        name: String::new(),
        ndims: 3,
        n_particles: 0,
        log_dims3: [0; 3],
        dims3: [1.0; 3],
        bbox: BBox { min: [0.0; 3], max: [1.0; 3] },
        base_height: 0,
        max_height: 0,
        n_levels: 1,
        block_bits: 3,
        accuracy: 0.0,
        version: (1, 0),
        max_level: 0,
        max_particle_subsampling: 1,
        max_n_bytes: u64::MAX,
        max_n_blocks: u64::MAX,
    };
    sexpr::read_idx_file(&in_file, &mut params)?;

    if let Some(l) = max_level {
        params.max_level = l;
    } else {
        params.max_level = params.n_levels - 1;
    }
    if let Some(n) = max_num_blocks {
        params.max_n_blocks = n;
    }
    if let Some(s) = max_subsampling {
        params.max_particle_subsampling = s;
    }

    let requested_height = match accuracy {
        Some(a) if a != 0.0 => params.height_for_accuracy(a),
        _ => height.unwrap_or(params.max_height),
    };
    params.max_height = requested_height.min(params.max_height).max(params.base_height);
    if let Some(a) = accuracy {
        params.accuracy = a;
    }

    info!("base_height = {}, max_height = {}", params.base_height, params.max_height);

    let mut source = FileBlockSource::new(&in_file, &params.name, params.n_levels);
    let particles = decode(&params, &mut source, Strategy::ByError)?;
    info!("decoded {} particles", particles.len());
    xyz::write_xyz(&out_file, &particles)?;
    Ok(())
}

fn run_error(mut args: Arguments) -> anyhow::Result<()> {
    let in_file: String = require(&mut args, "in")?;
    let out_file: String = require(&mut args, "out")?;
    let dims: Vec<i64> = {
        let x: i64 = require(&mut args, "dims")?;
        let y: i64 = args
            .free_from_str()
            .map_err(|e| anyhow::anyhow!("{}: --dims: {e}", ExitCode::InvalidParameter))?;
        let z: i64 = args
            .free_from_str()
            .map_err(|e| anyhow::anyhow!("{}: --dims: {e}", ExitCode::InvalidParameter))?;
        vec![x, y, z]
    };

    let particles1 = xyz::read_xyz(&in_file)?;
    let particles2 = xyz::read_xyz(&out_file)?;
    let err = rmse(&particles1, &particles2, [dims[0], dims[1], dims[2]]);
    println!("error = {err}");
    Ok(())
}

/// `Error`: grids `particles1` onto a `dims` lattice, then measures the
/// RMSE between each `particles2` point and whatever landed in its voxel.
fn rmse(particles1: &[particle_lod_codec::geometry::Particle], particles2: &[particle_lod_codec::geometry::Particle], dims: [i64; 3]) -> f32 {
    let bbox = BBox::from_particles(particles1);
    let w3: [f32; 3] = std::array::from_fn(|d| bbox.size()[d] / dims[d] as f32);
    let voxel_of = |p: &particle_lod_codec::geometry::Particle| -> usize {
        let coord: [i64; 3] = std::array::from_fn(|d| (((p.pos[d] - bbox.min[d]) / w3[d]) as i64).min(dims[d] - 1).max(0));
        (coord[2] * dims[0] * dims[1] + coord[1] * dims[0] + coord[0]) as usize
    };

    let mut grid = vec![[0f32; 3]; (dims[0] * dims[1] * dims[2]).max(1) as usize];
    for p in particles1 {
        grid[voxel_of(p)] = p.pos;
    }

    let mut err = 0f64;
    for p in particles2 {
        let g = grid[voxel_of(p)];
        for d in 0..3 {
            let diff = (g[d] - p.pos[d]) as f64;
            err += diff * diff;
        }
    }
    (err.sqrt() / particles2.len().max(1) as f64) as f32
}

fn main() {
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
