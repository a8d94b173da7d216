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

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use ballast_configuration::{
    config::{load_balancer::LoadBalancerConfig, Config},
    options::Options,
};
use ballast_lb::{HealthStatus, LbEndpoint, PrioritySet, SelectionContext, ThreadAwareLoadBalancer, WorkerLocal};
use http::uri::Authority;

fn host(name: &str, weight: u32, health: HealthStatus) -> Arc<LbEndpoint> {
    Arc::new(
        LbEndpoint::builder()
            .with_authority(Authority::try_from(name).unwrap())
            .with_weight(weight)
            .with_health_status(health)
            .build(),
    )
}

fn healthy(names: &[&str]) -> Vec<Arc<LbEndpoint>> {
    names.iter().map(|name| host(name, 1, HealthStatus::Healthy)).collect()
}

fn balancer(set: &Arc<PrioritySet<LbEndpoint>>) -> Arc<ThreadAwareLoadBalancer<LbEndpoint>> {
    let config = LoadBalancerConfig { random_seed: Some(1), ..Default::default() };
    let lb = Arc::new(ThreadAwareLoadBalancer::new(Arc::clone(set), config));
    lb.initialize();
    lb
}

#[test]
fn rebuilt_tables_agree() {
    let names = ["a.example.com:80", "b.example.com:80", "c.example.com:80", "d.example.com:80"];
    let first = Arc::new(PrioritySet::new());
    first.update_hosts(0, healthy(&names));
    let second = Arc::new(PrioritySet::new());
    second.update_hosts(0, healthy(&names));

    let (mut a, mut b) = (balancer(&first).create(), balancer(&second).create());
    for user in 0..1000 {
        let context = SelectionContext::new().with_affinity_key(format!("user-{user}"));
        assert_eq!(a.choose_host(&context).unwrap().authority, b.choose_host(&context).unwrap().authority);
    }
}

#[test]
fn empty_priority_falls_back() {
    let set = Arc::new(PrioritySet::new());
    set.update_hosts(0, Vec::new());
    set.update_hosts(1, healthy(&["backup.example.com:80"]));
    let lb = balancer(&set);
    let mut worker = lb.create();
    for key in 0..200_u64 {
        assert_eq!(worker.choose_host(&key).unwrap().authority.host(), "backup.example.com");
    }
    assert_eq!(worker.choose_host(&()).unwrap().authority.host(), "backup.example.com");
}

#[test]
fn degraded_priority_shares_traffic() {
    let set = Arc::new(PrioritySet::new());
    set.update_hosts(
        0,
        vec![
            host("a.example.com:80", 1, HealthStatus::Healthy),
            host("b.example.com:80", 1, HealthStatus::Unhealthy),
            host("c.example.com:80", 1, HealthStatus::Unhealthy),
            host("d.example.com:80", 1, HealthStatus::Unhealthy),
        ],
    );
    set.update_hosts(1, healthy(&["backup.example.com:80"]));
    let lb = balancer(&set);
    // 1 of 4 healthy: 35% stays on priority 0, which is in panic
    let snapshot = lb.snapshot();
    assert_eq!(snapshot.healthy_load().as_slice(), [35, 65]);
    assert!(snapshot.per_priority_state()[0].global_panic());
    assert!(!snapshot.per_priority_state()[1].global_panic());

    let mut worker = lb.create();
    let on_backup = (0..10_000_u64)
        .filter(|key| worker.choose_host(key).unwrap().authority.host() == "backup.example.com")
        .count();
    assert_eq!(on_backup, 6_500);
}

#[test]
fn nothing_viable() {
    let set = Arc::new(PrioritySet::new());
    let lb = balancer(&set);
    let mut worker = lb.create();
    assert!(worker.choose_host(&()).is_none());

    set.update_hosts(0, vec![host("a.example.com:80", 0, HealthStatus::Healthy)]);
    set.update_hosts(1, Vec::new());
    assert!(worker.refresh_if_stale());
    assert!(worker.choose_host(&()).is_none());
    assert!(worker.choose_host(&5_u64).is_none());
}

#[test]
fn readers_never_see_partial_snapshots() {
    let generations = [
        healthy(&["a1.example.com:80", "a2.example.com:80"]),
        healthy(&["b1.example.com:80", "b2.example.com:80", "b3.example.com:80"]),
    ];
    let set = Arc::new(PrioritySet::new());
    set.update_hosts(0, generations[0].clone());
    let lb = balancer(&set);
    let workers = WorkerLocal::new(Arc::clone(lb.factory()));
    let done = AtomicBool::new(false);

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    let hosts: Vec<_> = workers.with(|worker| {
                        let priorities = worker.snapshot().per_priority_state().len();
                        assert_eq!(priorities, 1);
                        (0..16_u64).map(|key| worker.choose_host(&key).unwrap()).collect()
                    });
                    let generation = &hosts[0].authority.as_str()[..1];
                    assert!(hosts.iter().all(|h| h.authority.as_str().starts_with(generation)), "{hosts:?}");
                }
            });
        }

        for refresh in 0..1000 {
            set.update_hosts(0, generations[refresh % 2].clone());
        }
        done.store(true, Ordering::Release);
    });
    assert_eq!(lb.factory().version(), 1001);
}

#[test]
fn from_configuration() {
    let config = Config::from_yaml_str(
        r"
load_balancer:
  hashing:
    maglev:
      table_size: 65537
  hash_balance_factor: 1.25
  random_seed: 9
cluster:
  name: backends
  endpoints:
    - priority: 0
      lb_endpoints:
        - { address: '10.0.0.1:80', load_balancing_weight: 1 }
        - { address: '10.0.0.2:80', load_balancing_weight: 3 }
    - priority: 1
      lb_endpoints: ['10.0.1.1:80']
",
    )
    .unwrap();
    let set = Arc::new(PrioritySet::from_cluster(&config.cluster).unwrap());
    let lb =
        Arc::new(ThreadAwareLoadBalancer::new(Arc::clone(&set), config.load_balancer).with_active_request_load());
    lb.initialize();
    assert_eq!(lb.snapshot().healthy_load().as_slice(), [100, 0]);

    let mut worker = lb.create();
    let mut heavy = 0;
    for key in 0..4000_u64 {
        if worker.choose_host(&key).unwrap().authority.as_str() == "10.0.0.2:80" {
            heavy += 1;
        }
    }
    assert!((2800..=3200).contains(&heavy), "{heavy}");
}

#[test]
fn sample_configuration() {
    let options = Options::from_path(concat!(env!("CARGO_MANIFEST_DIR"), "/conf/lb-sim.yaml"));
    let config = Config::new(&options).unwrap();
    let set = Arc::new(PrioritySet::from_cluster(&config.cluster).unwrap());
    let host_sets = set.host_sets();
    assert_eq!(host_sets.len(), 2);
    assert_eq!(host_sets[0].localities().map(<[_]>::len), Some(2));

    let lb =
        Arc::new(ThreadAwareLoadBalancer::new(Arc::clone(&set), config.load_balancer).with_active_request_load());
    lb.initialize();
    let snapshot = lb.snapshot();
    // the unhealthy host is left out
    let weights = snapshot.per_priority_state()[0].normalized_weights().unwrap();
    assert_eq!(weights.len(), 3);

    let mut worker = lb.create();
    for _ in 0..100 {
        assert_ne!(worker.choose_host(&()).unwrap().authority.as_str(), "10.0.0.4:80");
    }
}
