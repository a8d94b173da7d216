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

pub mod common;
pub mod endpoints;
pub use endpoints::Cluster;
pub mod load_balancer;
pub use load_balancer::LoadBalancerConfig;
pub mod log;
pub use log::Log;

pub use crate::config::common::*;
use crate::{options::Options, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{fs::File, path::Path};

#[derive(Debug, Deserialize, Serialize, PartialEq, Default)]
pub struct Config {
    #[serde(skip_serializing_if = "is_default", default)]
    pub logging: Log,
    #[serde(skip_serializing_if = "is_default", default)]
    pub load_balancer: LoadBalancerConfig,
    #[serde(skip_serializing_if = "is_default", default)]
    pub cluster: Cluster,
}

impl Config {
    pub fn new(opt: &Options) -> Result<Self> {
        let config: Self = deserialize_yaml(&opt.config)?;
        config.cluster.validate().with_node("cluster")?;
        if config.cluster.endpoints.is_empty() {
            tracing::warn!(cluster = %config.cluster.name, "Cluster has no endpoints configured");
        }
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_path_to_error::deserialize(serde_yaml::Deserializer::from_str(yaml)).map_err(yaml_error)?;
        config.cluster.validate().with_node("cluster")?;
        Ok(config)
    }
}

pub fn deserialize_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)?;
    serde_path_to_error::deserialize(serde_yaml::Deserializer::from_reader(&file)).map_err(yaml_error)
}

fn yaml_error(e: serde_path_to_error::Error<serde_yaml::Error>) -> GenericError {
    let path = e.path().to_string();
    GenericError::Yaml { path, source: e.into_inner() }
}
