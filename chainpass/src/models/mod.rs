// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

pub mod amount;
pub mod event;
pub mod history;
pub mod ticket;
