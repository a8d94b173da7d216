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

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Logging settings for the simulator binary.
///
/// `RUST_LOG`, when set, takes precedence over `level`.
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct Log {
    #[serde(deserialize_with = "parse_filter", serialize_with = "write_filter")]
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub level: Option<EnvFilter>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub directory: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub thread_ids: bool,
}

impl Log {
    const DEFAULT_DIRECTIVES: &'static str = "info";

    /// Filter to install: `RUST_LOG` first, then the configured level, then `info`.
    pub fn env_filter(&self) -> EnvFilter {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return filter;
        }
        self.level
            .as_ref()
            .map(EnvFilter::to_string)
            .and_then(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new(Self::DEFAULT_DIRECTIVES))
    }

    /// Directory and file name of the log file, if file logging is enabled.
    pub fn file_target(&self) -> Option<(PathBuf, &str)> {
        let file = self.file.as_deref()?;
        Some((self.directory.clone().unwrap_or_else(|| PathBuf::from(".")), file))
    }
}

impl PartialEq for Log {
    fn eq(&self, other: &Self) -> bool {
        self.file == other.file
            && self.directory == other.directory
            && self.thread_ids == other.thread_ids
            && self.level.as_ref().map(EnvFilter::to_string) == other.level.as_ref().map(EnvFilter::to_string)
    }
}
impl Eq for Log {}

fn parse_filter<'de, D>(deserializer: D) -> std::result::Result<Option<EnvFilter>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).and_then(|directives| {
        directives.map(|s| EnvFilter::builder().parse(s)).transpose().map_err(
            |e: tracing_subscriber::filter::ParseError| serde::de::Error::custom(format!("invalid log level \"{e}\"")),
        )
    })
}

fn write_filter<S: Serializer>(value: &Option<EnvFilter>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    value.as_ref().map(EnvFilter::to_string).serialize(serializer)
}
