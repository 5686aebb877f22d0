/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

//! On-disk block layout shared by the encoder and the decoder (spec.md
//! §4.7-§4.8): one file per resolution level, holding every flushed block's
//! bytes back to back in write order, followed by a trailer of
//! `{size, block_id}` pairs, a block count, and the archive-wide maximum
//! block size.
//!
//! Grounded in `WriteBlock`/`FlushBlocksToFiles`/`ReadBlock` in
//! `original_source/multiresolution-tree.cpp`: blocks are written in
//! whatever order the encoder happens to flush them, the trailer records
//! their *write-order* sizes and ids, and the reader turns that into a
//! sorted `block_id -> byte offset` index via a running cumulative sum
//! before binary-searching it.

use crate::error::{err_exit_code, ExitCode};

/// One entry of a level file's trailing index: the size (in write order,
/// not sorted) and id of a flushed block.
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct BlockMeta {
    pub size: u64,
    pub block_id: u64,
}

/// Accumulates one resolution level's flushed blocks while encoding.
#[derive(Debug, Default)]
pub struct LevelBlob {
    bytes: Vec<u8>,
    index: Vec<BlockMeta>,
}

impl LevelBlob {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_block(&mut self, payload: &[u8], block_id: u64) {
        self.bytes.extend_from_slice(payload);
        self.index.push(BlockMeta {
            size: payload.len() as u64,
            block_id,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Serializes this level's file content: payload bytes, `max_block_size`
    /// zero-padding bytes (so every fixed-size block read stays in bounds),
    /// the write-order index, block count, and max block size.
    pub fn finish(&self, max_block_size: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.bytes.len() + max_block_size + self.index.len() * 16 + 12);
        out.extend_from_slice(&self.bytes);
        out.resize(out.len() + max_block_size, 0);
        out.extend_from_slice(bytemuck::cast_slice(&self.index));
        out.extend_from_slice(&(self.index.len() as u64).to_le_bytes());
        out.extend_from_slice(&(max_block_size as u32).to_le_bytes());
        out
    }
}

/// A parsed, in-memory level file ready for on-demand block lookup.
pub struct LevelArchive {
    bytes: Vec<u8>,
    max_block_size: usize,
    /// `(block_id, byte_offset, byte_size)`, sorted by `block_id`.
    offsets: Vec<(u64, u64, u64)>,
}

impl LevelArchive {
    pub fn parse(file_bytes: &[u8]) -> anyhow::Result<Self> {
        if file_bytes.len() < 12 {
            return err_exit_code(ExitCode::BadFormat, "level file too small to contain a trailer");
        }
        let len = file_bytes.len();
        let max_block_size = u32::from_le_bytes(file_bytes[len - 4..len].try_into().unwrap()) as usize;
        let n_blocks = u64::from_le_bytes(file_bytes[len - 12..len - 4].try_into().unwrap()) as usize;
        let meta_bytes_len = n_blocks * std::mem::size_of::<BlockMeta>();
        if len < 12 + meta_bytes_len + max_block_size {
            return err_exit_code(ExitCode::BadFormat, "level file trailer size mismatch");
        }
        let meta_start = len - 12 - meta_bytes_len;
        let padding_start = meta_start - max_block_size;
        let metas: &[BlockMeta] = bytemuck::cast_slice(&file_bytes[meta_start..len - 12]);

        let mut offsets = Vec::with_capacity(n_blocks);
        let mut acc = 0u64;
        for m in metas {
            offsets.push((m.block_id, acc, m.size));
            acc += m.size;
        }
        offsets.sort_by_key(|t| t.0);

        Ok(LevelArchive {
            bytes: file_bytes[..padding_start].to_vec(),
            max_block_size,
            offsets,
        })
    }

    pub fn block_count(&self) -> usize {
        self.offsets.len()
    }

    /// Looks up a block by id, returning up to `max_block_size` bytes
    /// starting at its offset (clamped to the buffer's end; the real
    /// decoder never reads past the symbols it expects regardless).
    pub fn block_bytes(&self, block_id: u64) -> Option<&[u8]> {
        let idx = self.offsets.binary_search_by_key(&block_id, |t| t.0).ok()?;
        let (_, offset, _) = self.offsets[idx];
        let offset = offset as usize;
        let end = (offset + self.max_block_size).min(self.bytes.len());
        Some(&self.bytes[offset..end])
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn roundtrip_single_block() {
        let mut blob = LevelBlob::new();
        blob.push_block(&[1, 2, 3, 4], 0);
        let file_bytes = blob.finish(4);

        let archive = LevelArchive::parse(&file_bytes).unwrap();
        assert_eq!(archive.block_count(), 1);
        assert_eq!(&archive.block_bytes(0).unwrap()[..4], &[1, 2, 3, 4]);
        assert!(archive.block_bytes(1).is_none());
    }

    #[test]
    fn roundtrip_many_blocks_out_of_order_ids() {
        let mut blob = LevelBlob::new();
        blob.push_block(&[0xAA; 3], 2);
        blob.push_block(&[0xBB; 5], 0);
        blob.push_block(&[0xCC; 2], 1);
        let max_block_size = 5;
        let file_bytes = blob.finish(max_block_size);

        let archive = LevelArchive::parse(&file_bytes).unwrap();
        assert_eq!(archive.block_count(), 3);
        assert_eq!(&archive.block_bytes(0).unwrap()[..5], &[0xBB; 5]);
        assert_eq!(&archive.block_bytes(1).unwrap()[..2], &[0xCC; 2]);
        assert_eq!(&archive.block_bytes(2).unwrap()[..3], &[0xAA; 3]);
    }
}
