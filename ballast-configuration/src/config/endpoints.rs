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

use super::common::{is_default, GenericError, WithNodeOnResult};

use compact_str::CompactString;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt::Display, net::SocketAddr};

/// Static endpoint assignment for the cluster being balanced.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Default)]
pub struct Cluster {
    #[serde(skip_serializing_if = "is_default", default)]
    pub name: CompactString,
    #[serde(
        serialize_with = "simplify_locality_lb_endpoints",
        deserialize_with = "deser_through::<LocalityLbEndpointsDeser,_,_>",
        skip_serializing_if = "Vec::is_empty",
        default
    )]
    pub endpoints: Vec<LocalityLbEndpoints>,
}

impl Cluster {
    /// Rejects assignments whose per-locality weight sum would overflow a `u32`.
    pub fn validate(&self) -> Result<(), GenericError> {
        for (i, locality) in self.endpoints.iter().enumerate() {
            locality.weight_sum().map(|_| ()).with_index(i).with_node("endpoints")?;
        }
        Ok(())
    }

    /// Highest priority level present, or `None` if there are no endpoints.
    pub fn max_priority(&self) -> Option<u32> {
        self.endpoints.iter().map(|l| l.priority).max()
    }
}

fn simplify_locality_lb_endpoints<S: Serializer>(
    value: &Vec<LocalityLbEndpoints>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    if value.len() == 1 && value[0].priority == 0 && value[0].load_balancing_weight.is_none() {
        simplify_lb_endpoints(&value[0].lb_endpoints, serializer)
    } else {
        value.serialize(serializer)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum LocalityLbEndpointsDeser {
    LocalityLbEndpoints(Vec<LocalityLbEndpoints>),
    Simplified(LbEndpointVecDeser),
}

impl From<LocalityLbEndpointsDeser> for Vec<LocalityLbEndpoints> {
    fn from(value: LocalityLbEndpointsDeser) -> Self {
        match value {
            LocalityLbEndpointsDeser::Simplified(simple) => {
                vec![LocalityLbEndpoints { priority: 0, load_balancing_weight: None, lb_endpoints: simple.into() }]
            },
            LocalityLbEndpointsDeser::LocalityLbEndpoints(vec) => vec,
        }
    }
}

/// A group of endpoints sharing a priority level and, optionally, a locality weight.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalityLbEndpoints {
    #[serde(skip_serializing_if = "is_default", default)]
    pub priority: u32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub load_balancing_weight: Option<u32>,
    #[serde(serialize_with = "simplify_lb_endpoints", deserialize_with = "deser_through::<LbEndpointVecDeser,_,_>")]
    pub lb_endpoints: Vec<LbEndpoint>,
}

impl LocalityLbEndpoints {
    fn weight_sum(&self) -> Result<u32, GenericError> {
        self.lb_endpoints
            .iter()
            .try_fold(0u32, |sum, e| sum.checked_add(e.load_balancing_weight))
            .ok_or_else(|| GenericError::from_msg("Sum of weights has to be less than 4_294_967_295"))
    }
}

fn simplify_lb_endpoints<S: Serializer>(value: &Vec<LbEndpoint>, serializer: S) -> Result<S::Ok, S::Error> {
    if value.iter().all(|s| is_default(&s.health_status) && s.load_balancing_weight == DEFAULT_WEIGHT) {
        value.iter().map(|endpoint| endpoint.address).collect::<Vec<_>>().serialize(serializer)
    } else {
        value.serialize(serializer)
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum LbEndpointVecDeser {
    LbEndpoints(Vec<LbEndpoint>),
    Address(Vec<SocketAddr>),
}

impl From<LbEndpointVecDeser> for Vec<LbEndpoint> {
    fn from(value: LbEndpointVecDeser) -> Self {
        match value {
            LbEndpointVecDeser::Address(address) => address
                .into_iter()
                .map(|address| LbEndpoint {
                    address,
                    health_status: HealthStatus::default(),
                    load_balancing_weight: DEFAULT_WEIGHT,
                })
                .collect(),
            LbEndpointVecDeser::LbEndpoints(vec) => vec,
        }
    }
}

fn deser_through<'de, In: Deserialize<'de>, Out: From<In>, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Out, D::Error> {
    In::deserialize(deserializer).map(Out::from)
}

const DEFAULT_WEIGHT: u32 = 1;

const fn default_weight() -> u32 {
    DEFAULT_WEIGHT
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LbEndpoint {
    pub address: SocketAddr,
    #[serde(skip_serializing_if = "is_default", default)]
    pub health_status: HealthStatus,
    /// Zero is allowed and removes the endpoint from weighted selection.
    #[serde(default = "default_weight")]
    pub load_balancing_weight: u32,
}

#[derive(Clone, Debug, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    #[default]
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(self) -> bool {
        self == HealthStatus::Healthy
    }

    /// Healthy or degraded endpoints may receive traffic outside of panic mode.
    pub fn is_available(self) -> bool {
        self != HealthStatus::Unhealthy
    }
}

impl Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            HealthStatus::Healthy => "Healthy",
            HealthStatus::Degraded => "Degraded",
            HealthStatus::Unhealthy => "Unhealthy",
        })
    }
}
