/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Top-level decode entry point (spec.md §4.8-§4.10), tying together the
//! on-demand block source, the [`block_table::BlockTable`], the
//! [`scheduler::RefinementScheduler`] and the particle reconstructor.

pub mod block_table;
pub mod reconstruct;
pub mod scheduler;

use crate::archive::LevelArchive;
use crate::error::{err_exit_code, ExitCode};
use crate::geometry::Particle;
use crate::params::Params;
use block_table::BlockTable;
use scheduler::{RefinementScheduler, Strategy};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Where block bytes come from. Exists so the scheduler (and its tests)
/// don't need real files: production decoding goes through
/// [`FileBlockSource`], in-memory round-trip tests can hand it a fake.
pub trait BlockSource {
    fn resolution_bytes(&mut self) -> anyhow::Result<Vec<u8>>;
    /// `None` means the level file (or that block within it) is absent —
    /// spec.md §7: "decoder's `ReadBlock` returns a not-present signal".
    fn read_block(&mut self, level: i32, block_id: u64, height: u32) -> anyhow::Result<Option<Vec<u8>>>;
}

/// Reads `"<name>-<level>.bin"` files from disk, parsing each level's
/// trailer once on first access and caching the result (spec.md §4.8 "On
/// first access to level ℓ, parse the trailer").
pub struct FileBlockSource {
    dir: PathBuf,
    name: String,
    n_levels: i32,
    resolution_bytes: Option<Vec<u8>>,
    levels: HashMap<i32, Option<LevelArchive>>,
}

impl FileBlockSource {
    pub fn new(idx_path: impl AsRef<Path>, name: &str, n_levels: i32) -> Self {
        let dir = idx_path.as_ref().parent().map(Path::to_path_buf).unwrap_or_default();
        FileBlockSource {
            dir,
            name: name.to_string(),
            n_levels,
            resolution_bytes: None,
            levels: HashMap::new(),
        }
    }

    fn level_path(&self, level: i32) -> PathBuf {
        self.dir.join(format!("{}-{}.bin", self.name, level))
    }
}

impl BlockSource for FileBlockSource {
    fn resolution_bytes(&mut self) -> anyhow::Result<Vec<u8>> {
        if self.resolution_bytes.is_none() {
            let path = self.level_path(self.n_levels);
            let bytes = std::fs::read(&path)
                .map_err(|e| anyhow::anyhow!("{}: failed to read resolution file {}: {e}", ExitCode::IoError, path.display()))?;
            self.resolution_bytes = Some(bytes);
        }
        Ok(self.resolution_bytes.clone().unwrap())
    }

    fn read_block(&mut self, level: i32, block_id: u64, _height: u32) -> anyhow::Result<Option<Vec<u8>>> {
        if !self.levels.contains_key(&level) {
            let path = self.level_path(level);
            let archive = match std::fs::read(&path) {
                Ok(bytes) => Some(LevelArchive::parse(&bytes)?),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => return err_exit_code(ExitCode::IoError, format!("failed to read level file {}: {e}", path.display())),
            };
            self.levels.insert(level, archive);
        }
        Ok(self.levels[&level].as_ref().and_then(|a| a.block_bytes(block_id)).map(<[u8]>::to_vec))
    }
}

/// Drives the scheduler until the heap runs dry or the configured
/// byte/block budget trips, then reconstructs every particle reachable
/// from whatever got decoded (spec.md §4.9 "Termination").
pub fn decode(params: &Params, source: &mut dyn BlockSource, strategy: Strategy) -> anyhow::Result<Vec<Particle>> {
    let mut table = BlockTable::new(params);
    let mut scheduler = RefinementScheduler::new(params);

    while scheduler.is_within_budget(params) {
        if !scheduler.step(params, &mut table, source, strategy)? {
            break;
        }
    }

    Ok(reconstruct::reconstruct_all(&mut table, params))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::encoder::{compute_grid, encode};
    use crate::geometry::{BBox, Particle};

    fn cube_particles() -> Vec<Particle> {
        let mut out = Vec::new();
        for z in 0..2 {
            for y in 0..2 {
                for x in 0..2 {
                    out.push(Particle::new([x as f32 + 0.5, y as f32 + 0.5, z as f32 + 0.5]));
                }
            }
        }
        out
    }

    struct MemSource {
        resolution: Vec<u8>,
        levels: Vec<Vec<u8>>,
    }
    impl BlockSource for MemSource {
        fn resolution_bytes(&mut self) -> anyhow::Result<Vec<u8>> {
            Ok(self.resolution.clone())
        }
        fn read_block(&mut self, level: i32, block_id: u64, _height: u32) -> anyhow::Result<Option<Vec<u8>>> {
            let bytes = &self.levels[level as usize];
            let archive = LevelArchive::parse(bytes)?;
            Ok(archive.block_bytes(block_id).map(<[u8]>::to_vec))
        }
    }

    #[test]
    fn full_budget_decode_recovers_all_particles_scenario_a() {
        let mut particles = cube_particles();
        let bbox = BBox::from_particles(&particles);
        let log_dims3 = compute_grid(&mut particles, bbox, 0, 3);
        let base_height = log_dims3.iter().sum();

        let params = Params {
            name: "t".into(),
            ndims: 3,
            n_particles: particles.len() as i64,
            log_dims3,
            dims3: std::array::from_fn(|d| (1u32 << log_dims3[d]) as f32),
            bbox,
            base_height,
            max_height: base_height,
            n_levels: 1,
            block_bits: 3,
            accuracy: 0.0,
            version: (1, 0),
            max_level: 0,
            max_particle_subsampling: 0,
            max_n_bytes: u64::MAX,
            max_n_blocks: u64::MAX,
        };

        let archive = encode(&mut particles, &params);
        let mut source = MemSource {
            resolution: archive.resolution_bytes,
            levels: archive.level_bytes,
        };

        let decoded = decode(&params, &mut source, Strategy::ByLevel).unwrap();
        assert_eq!(decoded.len(), particles.len());
        for p in &decoded {
            assert!(params.bbox.contains(p, 1e-4));
        }
    }

    #[test]
    fn byte_budget_of_zero_yields_no_particles() {
        let mut particles = cube_particles();
        let bbox = BBox::from_particles(&particles);
        let log_dims3 = compute_grid(&mut particles, bbox, 0, 3);
        let base_height = log_dims3.iter().sum();

        let mut params = Params {
            name: "t".into(),
            ndims: 3,
            n_particles: particles.len() as i64,
            log_dims3,
            dims3: std::array::from_fn(|d| (1u32 << log_dims3[d]) as f32),
            bbox,
            base_height,
            max_height: base_height,
            n_levels: 1,
            block_bits: 3,
            accuracy: 0.0,
            version: (1, 0),
            max_level: 0,
            max_particle_subsampling: 0,
            max_n_bytes: u64::MAX,
            max_n_blocks: u64::MAX,
        };

        let archive = encode(&mut particles, &params);
        let mut source = MemSource {
            resolution: archive.resolution_bytes,
            levels: archive.level_bytes,
        };

        params.max_n_bytes = 0;
        let decoded = decode(&params, &mut source, Strategy::ByLevel).unwrap();
        assert!(decoded.is_empty());
    }
}
