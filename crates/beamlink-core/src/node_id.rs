//! Node identifiers (`name@host`).

use crate::error::NodeIdError;
use std::fmt;
use std::str::FromStr;

/// Identifies a peer node as `(name, host)`.
///
/// Parsed from `name@host`: exactly one `@`, both parts non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    name: String,
    host: String,
}

impl NodeId {
    /// Build a node identifier from its parts.
    ///
    /// # Errors
    ///
    /// Returns `NodeIdError` if either part is empty or contains `@`.
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Result<Self, NodeIdError> {
        let name = name.into();
        let host = host.into();
        let input = format!("{name}@{host}");

        if name.is_empty() {
            return Err(NodeIdError {
                input,
                reason: "empty node name",
            });
        }
        if host.is_empty() {
            return Err(NodeIdError {
                input,
                reason: "empty host",
            });
        }
        if name.contains('@') || host.contains('@') {
            return Err(NodeIdError {
                input,
                reason: "more than one '@'",
            });
        }

        Ok(Self { name, host })
    }

    /// Node name (the part before `@`)
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Host (the part after `@`)
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The node's atom, as it appears in pids and references
    #[must_use]
    pub fn to_atom(&self) -> eetf::Atom {
        eetf::Atom::from(self.to_string())
    }

    /// Node that owns `pid`.
    ///
    /// # Errors
    ///
    /// Returns `NodeIdError` if the pid's node atom is not `name@host`.
    pub fn of_pid(pid: &eetf::Pid) -> Result<Self, NodeIdError> {
        pid.node.name.parse()
    }
}

impl FromStr for NodeId {
    type Err = NodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((name, host)) = s.split_once('@') else {
            return Err(NodeIdError {
                input: s.to_string(),
                reason: "missing '@'",
            });
        };
        Self::new(name, host)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        let node: NodeId = "foo@localhost".parse().unwrap();
        assert_eq!(node.name(), "foo");
        assert_eq!(node.host(), "localhost");
        assert_eq!(node.to_string(), "foo@localhost");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for input in ["foo", "@host", "foo@", "a@b@c", "", "@"] {
            assert!(input.parse::<NodeId>().is_err(), "accepted {input:?}");
        }
    }

    #[test]
    fn test_error_reason() {
        let err = "foo".parse::<NodeId>().unwrap_err();
        assert_eq!(err.reason, "missing '@'");
        let err = "a@b@c".parse::<NodeId>().unwrap_err();
        assert_eq!(err.reason, "more than one '@'");
    }

    #[test]
    fn test_of_pid() {
        let pid = eetf::Pid::new("bar@example.com", 10, 0, 1);
        let node = NodeId::of_pid(&pid).unwrap();
        assert_eq!(node.name(), "bar");
        assert_eq!(node.host(), "example.com");
    }

    #[test]
    fn test_to_atom() {
        let node = NodeId::new("baz", "h").unwrap();
        assert_eq!(node.to_atom().name, "baz@h");
    }
}
