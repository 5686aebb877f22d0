/*---------------------------------------------------------------------------------------------
 *  Copyright (c) Microsoft Corporation. All rights reserved.
 *  Licensed under the Apache License, Version 2.0. See LICENSE.txt in the project root for license information.
 *  This software incorporates material from third parties. See NOTICE.txt for details.
 *--------------------------------------------------------------------------------------------*/

use std::fmt::{Display, Formatter};

/// Coarse classification of failures, mirroring the process exit code the
/// CLI should use and the category of problem the caller is dealing with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// a required CLI flag was missing or had an unparseable value
    InvalidParameter,
    /// a file could not be opened or a read/write failed unexpectedly
    IoError,
    /// the `.idx` S-expression metadata was malformed
    BadFormat,
    /// decoded values violate a tree invariant (count mismatch, negative count, ...)
    StreamInconsistent,
    /// a requested block is not present in the archive
    NotFound,
}

impl Display for ExitCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExitCode::InvalidParameter => "invalid parameter",
            ExitCode::IoError => "io error",
            ExitCode::BadFormat => "bad format",
            ExitCode::StreamInconsistent => "stream inconsistent",
            ExitCode::NotFound => "not found",
        };
        f.write_str(s)
    }
}

/// Error type carrying both a machine-readable [`ExitCode`] and a message,
/// so the CLI can map failures to process exit status while library callers
/// still get a normal `std::error::Error`.
#[derive(Debug)]
pub struct CodecError {
    pub exit_code: ExitCode,
    pub message: String,
}

impl CodecError {
    pub fn new(exit_code: ExitCode, message: impl Into<String>) -> Self {
        CodecError {
            exit_code,
            message: message.into(),
        }
    }
}

impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.exit_code, self.message)
    }
}

impl std::error::Error for CodecError {}

/// Build and return an `Err` wrapping a [`CodecError`] with the given code
/// and message.
pub fn err_exit_code<T>(exit_code: ExitCode, message: impl Into<String>) -> anyhow::Result<T> {
    Err(CodecError::new(exit_code, message).into())
}
