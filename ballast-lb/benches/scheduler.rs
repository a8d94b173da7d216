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

use std::{hint::black_box, sync::Arc};

use ballast_configuration::config::load_balancer::{LoadBalancerConfig, SchedulerPolicy};
use ballast_lb::{LbEndpoint, PrioritySet, Scheduler, ThreadAwareLoadBalancer, WeightedScheduler};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use http::uri::Authority;
use rand::{rngs::SmallRng, SeedableRng};

fn scheduler(policy: SchedulerPolicy, entries: u32) -> WeightedScheduler<u32> {
    let mut scheduler = WeightedScheduler::new(policy, SmallRng::seed_from_u64(1));
    for value in 0..entries {
        // a handful of distinct weights, as in a typical cluster
        if scheduler.add(f64::from(value % 4 + 1), Arc::new(value)).is_err() {
            unreachable!("weights are positive");
        }
    }
    scheduler
}

fn benchmark_pick_and_requeue(c: &mut Criterion) {
    let mut group = c.benchmark_group("pick_and_requeue");
    for entries in [16, 256, 4096] {
        for policy in [SchedulerPolicy::Edf, SchedulerPolicy::Wrsq] {
            let mut scheduler = scheduler(policy, entries);
            group.bench_with_input(BenchmarkId::new(format!("{policy:?}"), entries), &entries, |b, _| {
                b.iter(|| black_box(scheduler.pick_and_requeue(&|value| f64::from(value % 4 + 1))));
            });
        }
    }
    group.finish();
}

fn benchmark_choose_host(c: &mut Criterion) {
    let hosts: Vec<_> = (0..64_u16)
        .filter_map(|port| Authority::try_from(format!("backend.example.com:{}", 8000 + port)).ok())
        .map(|authority| Arc::new(LbEndpoint::builder().with_authority(authority).build()))
        .collect();
    let set = Arc::new(PrioritySet::new());
    set.update_hosts(0, hosts);
    let lb = Arc::new(ThreadAwareLoadBalancer::new(set, LoadBalancerConfig::default()));
    lb.initialize();
    let mut worker = lb.create();

    let mut key = 0_u64;
    c.bench_function("choose_host_ring_hash", |b| {
        b.iter(|| {
            key = key.wrapping_add(0x9E37_79B9_7F4A_7C15);
            black_box(worker.choose_host(&key))
        });
    });
}

criterion_group!(benches, benchmark_pick_and_requeue, benchmark_choose_host);

criterion_main!(benches);
