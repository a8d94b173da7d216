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

use std::{
    borrow::Cow,
    fmt::{Debug, Display},
};

pub(crate) fn is_default<T: PartialEq + Default>(value: &T) -> bool {
    *value == T::default()
}

/// Primality test used to validate Maglev lookup table sizes.
pub const fn is_prime(n: usize) -> bool {
    if n <= 1 {
        return false;
    } else if n <= 3 {
        return true;
    }

    if n % 2 == 0 || n % 3 == 0 {
        return false;
    }

    // every prime above 3 is 6k ± 1, so test 5, 7, 11, 13, ... up to sqrt(n)
    let mut current = 5;
    let mut incr = 2;
    while current <= n / current {
        if n % current == 0 {
            return false;
        }
        current += incr;
        incr ^= 6;
    }

    true
}

enum TraceNode {
    Field(Cow<'static, str>),
    Index(usize),
}

impl Display for TraceNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceNode::Field(field) => f.write_str(field),
            TraceNode::Index(index) => f.write_str(&format!("[{index}]")),
        }
    }
}

/// Path to the offending field, innermost node first.
struct FieldTrace {
    vec: Vec<TraceNode>,
}

impl Display for FieldTrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut iter = self.vec.iter().rev();
        if let Some(first) = iter.next() {
            first.fmt(f)?;
        }
        for node in iter {
            if matches!(node, TraceNode::Field(_)) {
                f.write_str(" / ")?;
            }
            node.fmt(f)?;
        }
        Ok(())
    }
}

impl Debug for FieldTrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        (&self as &dyn Display).fmt(f)
    }
}

#[derive(thiserror::Error, Debug)]
#[allow(private_interfaces)]
pub enum GenericError {
    #[error("Error parsing field {0}")]
    TracedError(FieldTrace, #[source] Box<Self>),
    #[error("{0}")]
    Message(Cow<'static, str>),
    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: Cow<'static, str> },
    #[error("Failed to read configuration file")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse configuration at {path}")]
    Yaml { path: String, source: serde_yaml::Error },
}

impl GenericError {
    #[must_use]
    pub fn with_node<T: Into<Cow<'static, str>>>(self, node: T) -> Self {
        self.with_trace_node(TraceNode::Field(node.into()))
    }

    #[must_use]
    pub fn with_index(self, index: usize) -> Self {
        self.with_trace_node(TraceNode::Index(index))
    }

    #[must_use]
    fn with_trace_node(self, node: TraceNode) -> Self {
        match self {
            Self::TracedError(mut fields, error) => {
                fields.vec.push(node);
                Self::TracedError(fields, error)
            },
            other => Self::TracedError(FieldTrace { vec: vec![node] }, other.into()),
        }
    }

    pub fn invalid_value<T: Into<Cow<'static, str>>>(field: &'static str, reason: T) -> Self {
        Self::InvalidValue { field, reason: reason.into() }
    }

    pub fn from_msg<T: Into<Cow<'static, str>>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

pub trait WithNodeOnResult {
    #[must_use]
    fn with_node<T: Into<Cow<'static, str>>>(self, node: T) -> Self;
    #[must_use]
    fn with_index(self, index: usize) -> Self;
}

impl<T> WithNodeOnResult for Result<T, GenericError> {
    fn with_node<Node: Into<Cow<'static, str>>>(self, node: Node) -> Self {
        self.map_err(|e| e.with_node(node))
    }

    fn with_index(self, index: usize) -> Self {
        self.map_err(|e| e.with_index(index))
    }
}

#[cfg(test)]
mod test {
    use super::{is_prime, GenericError};

    #[test]
    fn primes() {
        let primes: Vec<_> = (0..30).filter(|n| is_prime(*n)).collect();
        assert_eq!(primes, [2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
        assert!(is_prime(65537));
        assert!(is_prime(257));
        assert!(!is_prime(65536));
        assert!(!is_prime(25));
        assert!(!is_prime(49));
    }

    #[test]
    fn traced_error_path() {
        let error = GenericError::invalid_value("table_size", "not a prime number")
            .with_node("maglev")
            .with_node("hashing")
            .with_index(1)
            .with_node("endpoints");
        assert_eq!(error.to_string(), "Error parsing field endpoints[1] / hashing / maglev");
    }
}
