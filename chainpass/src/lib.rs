// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

pub use config::ChainpassConfig;

pub mod actions;
pub mod chain;
pub mod config;
pub mod errors;
pub mod mock_mode;
pub mod models;
pub mod nft_preview;
pub mod notifications;
pub mod ownership;
pub mod reconciler;
pub mod session;
pub mod storage;
pub mod utils;
pub mod worker;
