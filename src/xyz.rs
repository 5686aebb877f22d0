/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! XYZ point-file reader/writer (spec.md §6), grounded in `ReadXYZ`/
//! `WriteXYZ` in `original_source/multiresolution-tree.cpp`: first line is
//! the particle count, second line is a dummy/ignored header, then one
//! `<char> <x> <y> <z>` line per particle. The leading character is not
//! otherwise meaningful to this codec (the original always writes `C`) but
//! is preserved on read so a foreign `.xyz` file with per-particle tags
//! still parses.

use crate::error::{err_exit_code, ExitCode};
use crate::geometry::Particle;
use std::io::Write;
use std::path::Path;

pub fn read_xyz(path: impl AsRef<Path>) -> anyhow::Result<Vec<Particle>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("{}: failed to open xyz file {}: {e}", ExitCode::IoError, path.display()))?;
    let mut lines = text.lines();

    let n_particles: usize = lines
        .next()
        .ok_or_else(|| anyhow::anyhow!("{}: empty xyz file", ExitCode::BadFormat))?
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{}: xyz particle count is not an integer", ExitCode::BadFormat))?;
    lines.next(); // dummy second line

    let mut particles = Vec::with_capacity(n_particles);
    for (i, line) in lines.enumerate().take(n_particles) {
        let mut fields = line.split_whitespace();
        fields.next(); // leading tag character, unused
        let mut pos = [0f32; 3];
        for d in pos.iter_mut() {
            let tok = fields
                .next()
                .ok_or_else(|| anyhow::anyhow!("{}: xyz line {} missing a coordinate", ExitCode::BadFormat, i + 3))?;
            *d = tok
                .parse()
                .map_err(|_| anyhow::anyhow!("{}: xyz line {} has a non-numeric coordinate", ExitCode::BadFormat, i + 3))?;
        }
        particles.push(Particle::new(pos));
    }
    if particles.len() != n_particles {
        return err_exit_code(
            ExitCode::BadFormat,
            format!("xyz header promised {n_particles} particles, found {}", particles.len()),
        );
    }
    Ok(particles)
}

pub fn write_xyz(path: impl AsRef<Path>, particles: &[Particle]) -> anyhow::Result<()> {
    let path = path.as_ref();
    let mut out = String::with_capacity(particles.len() * 32 + 16);
    out.push_str(&format!("{}\n", particles.len()));
    out.push_str("dummy\n");
    for p in particles {
        out.push_str(&format!("C {} {} {}\n", p.pos[0], p.pos[1], p.pos[2]));
    }
    let mut f = std::fs::File::create(path)
        .map_err(|e| anyhow::anyhow!("{}: failed to create xyz file {}: {e}", ExitCode::IoError, path.display()))?;
    f.write_all(out.as_bytes())
        .map_err(|e| anyhow::anyhow!("{}: failed to write xyz file {}: {e}", ExitCode::IoError, path.display()))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn roundtrip_through_a_temp_file() {
        let particles = vec![
            Particle::new([0.25, 0.5, 0.75]),
            Particle::new([1.0, -1.0, 2.5]),
        ];
        let path = std::env::temp_dir().join(format!("pcc-xyz-test-{}.xyz", std::process::id()));
        write_xyz(&path, &particles).unwrap();
        let back = read_xyz(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(back.len(), particles.len());
        for (a, b) in particles.iter().zip(back.iter()) {
            for d in 0..3 {
                assert!((a.pos[d] - b.pos[d]).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn rejects_truncated_header() {
        let path = std::env::temp_dir().join(format!("pcc-xyz-bad-{}.xyz", std::process::id()));
        std::fs::write(&path, "2\ndummy\nC 0 0 0\n").unwrap();
        let result = read_xyz(&path);
        std::fs::remove_file(&path).ok();
        assert!(result.is_err());
    }
}
