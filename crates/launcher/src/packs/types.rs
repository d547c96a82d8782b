use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a content pack provides. The set is closed; per-capability
/// collections are fixed-size mappings rather than hash maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackCapability {
    Behavior,
    Resource,
}

impl PackCapability {
    pub const ALL: [PackCapability; 2] = [PackCapability::Behavior, PackCapability::Resource];
}

impl fmt::Display for PackCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PackCapability::Behavior => f.write_str("behavior"),
            PackCapability::Resource => f.write_str("resource"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackVersion(pub [u32; 3]);

impl fmt::Display for PackVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0[0], self.0[1], self.0[2])
    }
}

/// One installable pack discovered under a candidate root. A manifest
/// with both a data and a resources module yields two descriptors that
/// share id, version, and source directory.
#[derive(Debug, Clone, PartialEq)]
pub struct PackDescriptor {
    pub capability: PackCapability,
    pub id: Uuid,
    pub version: PackVersion,
    pub source_dir: PathBuf,
}

/// The running set of resolved descriptors, merged across every
/// resolve call for one launch.
#[derive(Debug, Clone, Default)]
pub struct PackSet {
    behavior: Vec<PackDescriptor>,
    resource: Vec<PackDescriptor>,
}

impl PackSet {
    pub fn push(&mut self, descriptor: PackDescriptor) {
        match descriptor.capability {
            PackCapability::Behavior => self.behavior.push(descriptor),
            PackCapability::Resource => self.resource.push(descriptor),
        }
    }

    pub fn of(&self, capability: PackCapability) -> &[PackDescriptor] {
        match capability {
            PackCapability::Behavior => &self.behavior,
            PackCapability::Resource => &self.resource,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PackDescriptor> {
        self.behavior.iter().chain(self.resource.iter())
    }

    pub fn len(&self) -> usize {
        self.behavior.len() + self.resource.len()
    }

    pub fn is_empty(&self) -> bool {
        self.behavior.is_empty() && self.resource.is_empty()
    }
}
