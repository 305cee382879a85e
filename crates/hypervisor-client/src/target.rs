//! Host target selectors
//!
//! A target renders to the control string understood by the host agents:
//! `inter=<host>`, `toall=<group>:<h1>,<h2>`, `select=<cpu>:<memory>:<disk>`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Resource constraints for picking any suitable host
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ResourceConstraints {
    pub cpu: u32,
    /// Memory in MiB
    pub memory: u64,
    /// Disk in GiB
    pub disk: u64,
}

/// Where a command runs
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum HostTarget {
    /// A single hypervisor
    Host(i32),
    /// Every member of a named host group
    Group { name: String, members: Vec<i32> },
    /// Any host with enough capacity
    Select(ResourceConstraints),
}

impl HostTarget {
    /// Target for a named group without an explicit member list
    pub fn group(name: impl Into<String>) -> Self {
        HostTarget::Group {
            name: name.into(),
            members: Vec::new(),
        }
    }
}

impl fmt::Display for HostTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostTarget::Host(id) => write!(f, "inter={}", id),
            HostTarget::Group { name, members } if members.is_empty() => write!(f, "toall={}", name),
            HostTarget::Group { name, members } => {
                let hosts: Vec<String> = members.iter().map(ToString::to_string).collect();
                write!(f, "toall={}:{}", name, hosts.join(","))
            }
            HostTarget::Select(c) => write!(f, "select={}:{}:{}", c.cpu, c.memory, c.disk),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_strings() {
        assert_eq!(HostTarget::Host(4).to_string(), "inter=4");
        assert_eq!(
            HostTarget::Group {
                name: "router-12".to_string(),
                members: vec![1, 2],
            }
            .to_string(),
            "toall=router-12:1,2"
        );
        assert_eq!(HostTarget::group("group-lb-3").to_string(), "toall=group-lb-3");
        assert_eq!(
            HostTarget::Select(ResourceConstraints {
                cpu: 2,
                memory: 2048,
                disk: 40,
            })
            .to_string(),
            "select=2:2048:40"
        );
    }
}
