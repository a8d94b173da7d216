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

pub mod balancers;
pub mod endpoint;
mod error;
pub mod priority_set;
pub mod scheduler;
pub mod snapshot;
pub mod thread_local;

pub use balancers::{
    bounded_load::{active_request_predicate, BoundedLoadHashingLoadBalancer, HostOverloadedPredicate},
    hash_policy::{LoadBalancerContext, SelectionContext},
    normalize::{normalize_host_weights, normalize_locality_weights, NormalizedHostWeights},
    priority::{DefaultPriorityPolicy, DegradedLoad, HealthyLoad, PriorityHealth, PriorityPolicy, PriorityStatus},
    thread_aware::{LoadBalancer, LoadBalancerFactory, PerPriorityState, Snapshot, ThreadAwareLoadBalancer},
    AnyTableBuilder, HashingLoadBalancer, TableBuilder,
};
pub use endpoint::{
    ActiveRequest, ActiveRequests, Endpoint, EndpointHealth, EndpointWithAuthority, EndpointWithLoad, HealthStatus,
    LbEndpoint, WeightedEndpoint,
};
pub use error::Error;
pub use priority_set::{HostSet, Locality, PrioritySet};
pub use scheduler::{Scheduler, WeightedScheduler};
pub use snapshot::SnapshotCell;
pub use crate::thread_local::WorkerLocal;

pub type Result<T> = ::core::result::Result<T, Error>;
