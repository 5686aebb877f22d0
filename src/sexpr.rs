/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! Minimal S-expression metadata format for the `.idx` sidecar file
//! (spec.md §6), grounded in `WriteMetaFile`/`ReadMetaFile` in
//! `original_source/multiresolution-tree.cpp`.
//!
//! This is not a general S-expression engine: it writes exactly the nested
//! `(common ...) (format ...)` layout the original produces, and the
//! reader walks the same `(identifier value...)` shape the original's
//! stack-based `SExpr` traversal does, looking only for the handful of
//! keys the codec cares about. Anything else in the file (comments,
//! unknown keys, extra nesting) is silently skipped.

use crate::error::{err_exit_code, ExitCode};
use crate::geometry::BBox;
use crate::params::Params;
use std::path::Path;

/// Serializes the parameters needed to decode an archive, in the original's
/// `(common (name ...) (particles ...) ...) (format (version ...) ...)`
/// layout.
pub fn write_idx(params: &Params) -> String {
    let mut out = String::new();
    out.push_str("(\n");
    out.push_str("  (common\n");
    out.push_str(&format!("    (name \"{}\")\n", params.name));
    out.push_str(&format!("    (particles {})\n", params.n_particles));
    out.push_str(&format!("    (dimensions {})\n", params.ndims));
    out.push_str(&format!(
        "    (grid {} {} {})\n",
        params.dims3[0] as i64, params.dims3[1] as i64, params.dims3[2] as i64
    ));
    out.push_str(&format!(
        "    (bounding-box {:.10} {:.10} {:.10} {:.10} {:.10} {:.10})\n",
        params.bbox.min[0], params.bbox.min[1], params.bbox.min[2], params.bbox.max[0], params.bbox.max[1], params.bbox.max[2]
    ));
    out.push_str("  )\n");
    out.push_str("  (format\n");
    out.push_str(&format!("    (version {} {})\n", params.version.0, params.version.1));
    out.push_str(&format!("    (resolutions {})\n", params.n_levels));
    out.push_str(&format!("    (block-bits {})\n", params.block_bits));
    out.push_str(&format!("    (accuracy {:.10})\n", params.accuracy));
    out.push_str(&format!("    (height {})\n", params.max_height));
    out.push_str("  )\n");
    out.push_str(")\n");
    out
}

pub fn write_idx_file(params: &Params, path: impl AsRef<Path>) -> anyhow::Result<()> {
    std::fs::write(path.as_ref(), write_idx(params))
        .map_err(|e| anyhow::anyhow!("{}: failed to write idx file {}: {e}", ExitCode::IoError, path.as_ref().display()))
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    LParen,
    RParen,
    Id(String),
    Str(String),
    Num(f64),
}

fn tokenize(text: &str) -> anyhow::Result<Vec<(Token, usize)>> {
    let mut tokens = Vec::new();
    let mut line = 1usize;
    let bytes = text.as_bytes();
    let mut i = 0usize;
    while i < bytes.len() {
        let c = bytes[i] as char;
        match c {
            '\n' => {
                line += 1;
                i += 1;
            }
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push((Token::LParen, line));
                i += 1;
            }
            ')' => {
                tokens.push((Token::RParen, line));
                i += 1;
            }
            '"' => {
                let start = i + 1;
                let mut j = start;
                while j < bytes.len() && bytes[j] as char != '"' {
                    j += 1;
                }
                if j >= bytes.len() {
                    return err_exit_code(ExitCode::BadFormat, format!("line {line}: unterminated string"));
                }
                tokens.push((Token::Str(text[start..j].to_string()), line));
                i = j + 1;
            }
            _ => {
                let start = i;
                while i < bytes.len() {
                    let c = bytes[i] as char;
                    if c.is_whitespace() || c == '(' || c == ')' {
                        break;
                    }
                    i += 1;
                }
                let word = &text[start..i];
                if let Ok(n) = word.parse::<f64>() {
                    tokens.push((Token::Num(n), line));
                } else {
                    tokens.push((Token::Id(word.to_string()), line));
                }
            }
        }
    }
    Ok(tokens)
}

/// The subset of `.idx` fields this reader populates directly onto a
/// caller-supplied default `Params`; any field the metadata file is
/// missing keeps its caller-provided default (matching the original's
/// `Params` being a single persistent global that `ReadMetaFile` only
/// partially overwrites).
pub fn read_idx(text: &str, params: &mut Params) -> anyhow::Result<()> {
    let tokens = tokenize(text)?;
    // Walk flat: find every `( <id> <atoms...> )` at any nesting depth and
    // dispatch on the id, mirroring the original's stack-based traversal
    // without needing to build a real tree.
    let mut i = 0usize;
    while i < tokens.len() {
        if tokens[i].0 == Token::LParen {
            if let Some((Token::Id(key), line)) = tokens.get(i + 1).cloned() {
                let rest_start = i + 2;
                let mut j = rest_start;
                while j < tokens.len() && tokens[j].0 != Token::RParen {
                    j += 1;
                }
                if j >= tokens.len() {
                    return err_exit_code(ExitCode::BadFormat, format!("line {line}: unterminated list"));
                }
                apply_key(params, &key, &tokens[rest_start..j], line)?;
            }
        }
        i += 1;
    }
    Ok(())
}

fn want_num(atoms: &[(Token, usize)], idx: usize, line: usize) -> anyhow::Result<f64> {
    match atoms.get(idx) {
        Some((Token::Num(n), _)) => Ok(*n),
        _ => err_exit_code(ExitCode::BadFormat, format!("line {line}: expected a number")),
    }
}

fn apply_key(params: &mut Params, key: &str, atoms: &[(Token, usize)], line: usize) -> anyhow::Result<()> {
    match key {
        "name" => {
            if let Some((Token::Str(s), _)) = atoms.first() {
                params.name = s.clone();
            }
        }
        "particles" => params.n_particles = want_num(atoms, 0, line)? as i64,
        "dimensions" => params.ndims = want_num(atoms, 0, line)? as usize,
        "grid" => {
            let dims3 = [
                want_num(atoms, 0, line)? as f32,
                want_num(atoms, 1, line)? as f32,
                want_num(atoms, 2, line)? as f32,
            ];
            params.dims3 = dims3;
            params.log_dims3 = std::array::from_fn(|d| crate::helpers::log2_floor(dims3[d] as u32));
            params.base_height = params.log_dims3[0] + params.log_dims3[1] + params.log_dims3[2];
        }
        "accuracy" => params.accuracy = want_num(atoms, 0, line)? as f32,
        "height" => params.max_height = want_num(atoms, 0, line)? as u32,
        "bounding-box" => {
            params.bbox = BBox {
                min: [
                    want_num(atoms, 0, line)? as f32,
                    want_num(atoms, 1, line)? as f32,
                    want_num(atoms, 2, line)? as f32,
                ],
                max: [
                    want_num(atoms, 3, line)? as f32,
                    want_num(atoms, 4, line)? as f32,
                    want_num(atoms, 5, line)? as f32,
                ],
            };
        }
        "resolutions" => params.n_levels = want_num(atoms, 0, line)? as i32,
        "block-bits" => params.block_bits = want_num(atoms, 0, line)? as u32,
        "version" => {
            params.version = (want_num(atoms, 0, line)? as i32, want_num(atoms, 1, line)? as i32);
        }
        _ => {}
    }
    Ok(())
}

pub fn read_idx_file(path: impl AsRef<Path>, params: &mut Params) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(path.as_ref())
        .map_err(|e| anyhow::anyhow!("{}: failed to open idx file {}: {e}", ExitCode::IoError, path.as_ref().display()))?;
    read_idx(&text, params)
}

#[cfg(test)]
mod test {
    use super::*;

    fn default_params() -> Params {
        Params {
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
        }
    }

    #[test]
    fn write_then_read_roundtrips_every_field() {
        let mut params = default_params();
        params.name = "out".into();
        params.n_particles = 1024;
        params.ndims = 3;
        params.dims3 = [8.0, 8.0, 8.0];
        params.log_dims3 = [3, 3, 3];
        params.base_height = 9;
        params.bbox = BBox {
            min: [0.0, -1.0, 2.0],
            max: [8.0, 7.0, 10.0],
        };
        params.n_levels = 3;
        params.block_bits = 4;
        params.accuracy = 0.125;
        params.max_height = 12;
        params.version = (1, 0);

        let text = write_idx(&params);
        let mut back = default_params();
        read_idx(&text, &mut back).unwrap();

        assert_eq!(back.name, "out");
        assert_eq!(back.n_particles, 1024);
        assert_eq!(back.ndims, 3);
        assert_eq!(back.dims3, [8.0, 8.0, 8.0]);
        assert_eq!(back.log_dims3, [3, 3, 3]);
        assert_eq!(back.base_height, 9);
        assert_eq!(back.bbox.min, [0.0, -1.0, 2.0]);
        assert_eq!(back.bbox.max, [8.0, 7.0, 10.0]);
        assert_eq!(back.n_levels, 3);
        assert_eq!(back.block_bits, 4);
        assert!((back.accuracy - 0.125).abs() < 1e-6);
        assert_eq!(back.max_height, 12);
        assert_eq!(back.version, (1, 0));
    }

    #[test]
    fn unterminated_string_is_a_format_error() {
        let mut params = default_params();
        let result = read_idx("(common (name \"unterminated))", &mut params);
        assert!(result.is_err());
    }
}
