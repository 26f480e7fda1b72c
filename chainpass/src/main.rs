// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use chainpass::ChainpassConfig;
use clap::Parser;
use server_framework::ServerArgs;
use std::sync::atomic::{AtomicUsize, Ordering};

const MIN_WORKER_THREADS: usize = 4;

fn main() -> Result<()> {
    let num_cpus = std::thread::available_parallelism().map_or(1, |n| n.get());
    let worker_threads = num_cpus.max(MIN_WORKER_THREADS);
    println!(
        "[ChainPass] Starting tokio runtime: num_cpus={}, worker_threads={}",
        num_cpus, worker_threads
    );

    let atomic_id = AtomicUsize::new(0);

    tokio::runtime::Builder::new_multi_thread()
        .thread_name_fn(move || {
            let id = atomic_id.fetch_add(1, Ordering::SeqCst);
            format!("tokio-{}", id)
        })
        .enable_all()
        .worker_threads(worker_threads)
        .build()?
        .block_on(async {
            let args = ServerArgs::parse();
            args.run::<ChainpassConfig>(tokio::runtime::Handle::current())
                .await
        })
}
