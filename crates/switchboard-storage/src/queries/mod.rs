// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. Every function takes a [`crate::Database`] and runs on
//! its background connection.

pub mod mappings;
pub mod sessions;
