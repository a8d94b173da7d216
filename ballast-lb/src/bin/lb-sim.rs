// SPDX-FileCopyrightText: © 2025 Huawei Cloud Computing Technologies Co., Ltd
// SPDX-License-Identifier: Apache-2.0
//
// Copyright 2025 Huawei Cloud Computing Technologies Co., Ltd
//
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
//

use std::{collections::VecDeque, sync::Arc};

use ballast_configuration::{
    config::{Config, Log},
    options::Options,
};
use ballast_lb::{LbEndpoint, PrioritySet, Result, SelectionContext, ThreadAwareLoadBalancer, WorkerLocal};
use http::uri::Authority;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use rustc_hash::FxHashMap as HashMap;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _};

// requests each worker keeps outstanding
const IN_FLIGHT: usize = 16;
const SESSIONS: u64 = 1024;

fn main() -> Result<()> {
    let options = Options::parse_options();
    let Config { logging, load_balancer, cluster } = Config::new(&options)?;
    let _guard = init_tracing(&logging);

    let base_seed = load_balancer.random_seed.unwrap_or_else(rand::random);
    let priority_set = Arc::new(PrioritySet::from_cluster(&cluster)?);
    info!(cluster = %cluster.name, priorities = priority_set.len(), "Loaded cluster");

    let lb = Arc::new(
        ThreadAwareLoadBalancer::new(Arc::clone(&priority_set), load_balancer).with_active_request_load(),
    );
    lb.initialize();
    let snapshot = lb.snapshot();
    info!(
        healthy_load = ?snapshot.healthy_load().as_slice(),
        degraded_load = ?snapshot.degraded_load().as_slice(),
        "Priority loads"
    );

    let workers = WorkerLocal::new(Arc::clone(lb.factory()));
    let requests = options.requests.get();
    let per_worker: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0_u64..)
            .take(options.workers.get())
            .map(|worker| {
                let workers = &workers;
                scope.spawn(move || simulate(workers, base_seed.wrapping_add(worker), requests))
            })
            .collect();
        handles.into_iter().filter_map(|handle| handle.join().ok()).collect()
    });

    let mut totals = HashMap::<Authority, usize>::default();
    for counts in per_worker {
        for (authority, count) in counts {
            *totals.entry(authority).or_default() += count;
        }
    }
    let total: usize = totals.values().sum();
    let mut totals: Vec<_> = totals.into_iter().collect();
    totals.sort_by(|(a, _), (b, _)| a.as_str().cmp(b.as_str()));
    for (authority, count) in totals {
        #[allow(clippy::cast_precision_loss)]
        let share = count as f64 * 100.0 / total.max(1) as f64;
        info!(host = %authority, requests = count, "{share:.2}% of traffic");
    }
    Ok(())
}

fn simulate(workers: &WorkerLocal<LbEndpoint>, seed: u64, requests: usize) -> HashMap<Authority, usize> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut in_flight = VecDeque::with_capacity(IN_FLIGHT);
    let mut counts = HashMap::default();

    for _ in 0..requests {
        let host = if rng.gen_ratio(1, 10) {
            workers.with(|lb| lb.choose_host(&()))
        } else {
            let context = SelectionContext::new().with_affinity_key(rng.gen_range(0..SESSIONS));
            workers.with(|lb| lb.choose_host(&context))
        };
        let Some(host) = host else {
            warn!("No host available");
            continue;
        };

        *counts.entry(host.authority.clone()).or_default() += 1;
        if in_flight.len() == IN_FLIGHT {
            in_flight.pop_front();
        }
        in_flight.push_back(host.start_request());
    }
    counts
}

fn init_tracing(log: &Log) -> WorkerGuard {
    let (writer, guard) = match log.file_target() {
        Some((directory, file)) => tracing_appender::non_blocking(tracing_appender::rolling::never(directory, file)),
        None => tracing_appender::non_blocking(std::io::stdout()),
    };
    let ansi = log.file.is_none() && std::io::IsTerminal::is_terminal(&std::io::stdout());
    let layer = fmt::layer()
        .with_writer(writer)
        .with_thread_names(true)
        .with_thread_ids(log.thread_ids)
        .with_ansi(ansi);
    tracing_subscriber::registry().with(log.env_filter()).with(layer).init();
    guard
}
