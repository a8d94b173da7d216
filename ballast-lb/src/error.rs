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

use ballast_configuration::config::GenericError;
use compact_str::CompactString;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Invalid scheduler weight {0}, weights must be finite and positive")]
    InvalidWeight(f64),
    #[error("Invalid endpoint address {address}")]
    InvalidAddress {
        address: CompactString,
        #[source]
        source: http::uri::InvalidUri,
    },
    #[error("Invalid configuration")]
    Configuration(#[from] GenericError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
