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

use std::{num::NonZeroUsize, path::PathBuf};

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(about = "Replays synthetic requests through the thread-aware load balancer")]
pub struct Options {
    #[arg(help = "Configuration file", short = 'c', long = "config")]
    pub config: PathBuf,
    #[arg(help = "Number of requests each worker issues", short = 'n', long = "requests", default_value = "10000")]
    pub requests: NonZeroUsize,
    #[arg(help = "Number of worker threads", short = 'w', long = "workers", default_value = "4")]
    pub workers: NonZeroUsize,
}

impl Options {
    pub fn parse_options() -> Self {
        Options::parse()
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            config: path.into(),
            requests: NonZeroUsize::MIN.saturating_add(9999),
            workers: NonZeroUsize::MIN.saturating_add(3),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Options;
    use clap::Parser;

    #[test]
    fn parse_short_flags() {
        let options = Options::try_parse_from(["lb-sim", "-c", "lb.yaml", "-n", "500", "-w", "2"]).unwrap();
        assert_eq!(options.config.to_str(), Some("lb.yaml"));
        assert_eq!(options.requests.get(), 500);
        assert_eq!(options.workers.get(), 2);
    }

    #[test]
    fn defaults() {
        let options = Options::try_parse_from(["lb-sim", "--config", "lb.yaml"]).unwrap();
        assert_eq!(options.requests.get(), 10000);
        assert_eq!(options.workers.get(), 4);
        assert!(Options::try_parse_from(["lb-sim", "-c", "lb.yaml", "-w", "0"]).is_err());
    }
}
