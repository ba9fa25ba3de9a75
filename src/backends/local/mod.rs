// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod factory;
pub mod tasks;

pub use factory::LocalTaskFactory;
pub use tasks::*;
