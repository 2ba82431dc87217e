// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Error Module
//!
//! Domain error types for the command pipeline system. See
//! [`pipeline_error`] for the full error taxonomy and handling strategy.

pub mod pipeline_error;

pub use pipeline_error::{PipelineError, ViolationKind};
