// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Proof Gateway Contributors

//! Clients for the external services this gateway fronts.

pub mod explorer;
pub mod pinata;
