// /////////////////////////////////////////////////////////////////////////////
// Command Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Application Layer
//!
//! Use-case orchestration over the domain core: the command dispatcher
//! (typed registry, metadata minting, admission control) and its secure
//! trust-boundary wrapper.

pub mod services;

pub use services::{CommandDispatcher, SecureDispatcher};
