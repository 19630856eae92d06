//! Symbolic heap state

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::shared::models::{owner_function, VarName};

/// Memory-safety properties the shape domain can check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryProperty {
    /// `free` on an already freed region
    DoubleFree,
    /// `free` on something that is not the start of a heap region
    InvalidFree,
    /// Dereference of null, a freed region or a non-pointer
    InvalidDeref,
    /// Allocated region no longer reachable
    MemoryLeak,
}

impl MemoryProperty {
    pub fn all() -> Vec<MemoryProperty> {
        vec![
            MemoryProperty::DoubleFree,
            MemoryProperty::InvalidFree,
            MemoryProperty::InvalidDeref,
            MemoryProperty::MemoryLeak,
        ]
    }
}

impl fmt::Display for MemoryProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MemoryProperty::DoubleFree => "double free",
            MemoryProperty::InvalidFree => "invalid free",
            MemoryProperty::InvalidDeref => "invalid dereference",
            MemoryProperty::MemoryLeak => "memory leak",
        };
        write!(f, "{}", s)
    }
}

/// Symbolic heap region id (canonical after every transfer)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(pub u32);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionStatus {
    Allocated,
    Freed,
    /// Freed along some of the merged executions
    MaybeFreed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    pub status: RegionStatus,
    /// Address stored somewhere the domain does not model (memory, unknown callee)
    pub escaped: bool,
}

impl Region {
    pub fn allocated() -> Self {
        Self {
            status: RegionStatus::Allocated,
            escaped: false,
        }
    }
}

/// Possible value of a pointer variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PointsTo {
    Null,
    Region(RegionId),
    /// Non-zero integer that is not an address
    Invalid,
}

/// Detected violation (the state is a target)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemoryViolation {
    pub property: MemoryProperty,
    pub detail: String,
}

/// Regions + points-to edges.
///
/// A pointer with one target has a must edge, with several targets may
/// edges; a variable without an entry may point anywhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ShapeState {
    pub regions: BTreeMap<RegionId, Region>,
    pub pointers: BTreeMap<VarName, BTreeSet<PointsTo>>,
    pub violation: Option<MemoryViolation>,
}

impl ShapeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn targets(&self, var: &str) -> Option<&BTreeSet<PointsTo>> {
        self.pointers.get(var)
    }

    /// Fresh allocated region
    pub fn allocate(&mut self) -> RegionId {
        let id = RegionId(self.regions.keys().next_back().map_or(0, |r| r.0 + 1));
        self.regions.insert(id, Region::allocated());
        id
    }

    pub fn region(&self, id: RegionId) -> Option<&Region> {
        self.regions.get(&id)
    }

    pub fn set_status(&mut self, id: RegionId, status: RegionStatus) {
        if let Some(r) = self.regions.get_mut(&id) {
            r.status = status;
        }
    }

    /// Mark every region `var` may point to as escaped
    pub fn escape(&mut self, var: &str) {
        let ids: Vec<RegionId> = self.region_targets(var).collect();
        for id in ids {
            if let Some(r) = self.regions.get_mut(&id) {
                r.escaped = true;
            }
        }
    }

    pub fn region_targets<'a>(&'a self, var: &str) -> impl Iterator<Item = RegionId> + 'a {
        self.pointers
            .get(var)
            .into_iter()
            .flatten()
            .filter_map(|t| match t {
                PointsTo::Region(id) => Some(*id),
                _ => None,
            })
    }

    pub fn forget_locals(&mut self, function: &str, keep: &[&str]) {
        self.pointers
            .retain(|v, _| owner_function(v) != Some(function) || keep.contains(&v.as_str()));
    }

    /// Drop unreachable regions and renumber the rest in order of first
    /// reference. Returns true if an allocated, non-escaped region was lost.
    pub fn collect_garbage(&mut self) -> bool {
        let mut order: Vec<RegionId> = Vec::new();
        for targets in self.pointers.values() {
            for t in targets {
                if let PointsTo::Region(id) = t {
                    if !order.contains(id) {
                        order.push(*id);
                    }
                }
            }
        }

        let leaked = self.regions.iter().any(|(id, r)| {
            !order.contains(id) && r.status == RegionStatus::Allocated && !r.escaped
        });

        let renumber: BTreeMap<RegionId, RegionId> = order
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, RegionId(i as u32)))
            .collect();
        let mut regions = BTreeMap::new();
        for (old, new) in &renumber {
            if let Some(r) = self.regions.get(old) {
                regions.insert(*new, *r);
            }
        }
        self.regions = regions;
        for targets in self.pointers.values_mut() {
            *targets = targets
                .iter()
                .map(|t| match t {
                    PointsTo::Region(id) => {
                        PointsTo::Region(renumber.get(id).copied().unwrap_or(*id))
                    }
                    other => *other,
                })
                .collect();
        }
        leaked
    }

    pub fn describe(&self, targets: &BTreeSet<PointsTo>) -> String {
        let parts: Vec<String> = targets
            .iter()
            .map(|t| match t {
                PointsTo::Null => "null".to_string(),
                PointsTo::Invalid => "invalid".to_string(),
                PointsTo::Region(id) => match self.regions.get(id).map(|r| r.status) {
                    Some(RegionStatus::Allocated) => format!("{} (allocated)", id),
                    Some(RegionStatus::Freed) => format!("{} (freed)", id),
                    Some(RegionStatus::MaybeFreed) => format!("{} (maybe freed)", id),
                    None => id.to_string(),
                },
            })
            .collect();
        if parts.len() == 1 {
            parts.join("")
        } else {
            format!("{{{}}}", parts.join(", "))
        }
    }
}
