//! Stat dependency resolution.
//!
//! Expands a target stat into the ordered list of stats that must be
//! generated first. Expansion is depth-first with an explicit visiting
//! set, so a cyclic dependency graph fails fast instead of recursing
//! forever. The final list is re-sorted by each stat's declared order,
//! which is the authoritative ordering.

use crate::registry::StatRegistry;
use std::collections::HashSet;
use thiserror::Error;

fn format_cycle_path(path: &[String]) -> String {
    path.join(" -> ")
}

/// Errors from dependency resolution.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The dependency graph contains a cycle; the path closes the loop.
    #[error("dependency cycle: {}", format_cycle_path(.path))]
    CycleDetected { path: Vec<String> },
}

/// Resolve the generation order for `target`.
///
/// Returns the stat names that must be produced, dependencies included,
/// sorted by declared order. A dependency naming an unknown stat is
/// excluded with a warning; an unknown target yields an empty list.
pub fn resolve(registry: &StatRegistry, target: &str) -> Result<Vec<String>, ResolveError> {
    if registry.stat_entry(target).is_none() {
        tracing::warn!(stat = target, "cannot resolve unknown stat");
        return Ok(Vec::new());
    }

    let mut expansion = Expansion {
        registry,
        visited: HashSet::new(),
        visiting: Vec::new(),
        required: Vec::new(),
    };
    expansion.expand(target)?;

    let mut required = expansion.required;
    required.sort_by_key(|name| {
        registry
            .stat_entry(name)
            .map(|d| d.order)
            .unwrap_or(i32::MAX)
    });
    Ok(required)
}

struct Expansion<'a> {
    registry: &'a StatRegistry,
    visited: HashSet<String>,
    visiting: Vec<String>,
    required: Vec<String>,
}

impl Expansion<'_> {
    fn expand(&mut self, name: &str) -> Result<(), ResolveError> {
        if self.visited.contains(name) {
            return Ok(());
        }
        if let Some(pos) = self.visiting.iter().position(|n| n == name) {
            let mut path = self.visiting[pos..].to_vec();
            path.push(name.to_string());
            return Err(ResolveError::CycleDetected { path });
        }
        let Some(def) = self.registry.stat_entry(name) else {
            // Unknown dependency: nothing to expand, nothing to require.
            tracing::warn!(stat = name, "skipping unknown stat dependency");
            return Ok(());
        };

        self.visiting.push(name.to_string());
        let dependencies = def.dependencies.clone();
        for dep in &dependencies {
            self.expand(dep)?;
        }
        self.visiting.pop();

        self.visited.insert(name.to_string());
        self.required.push(name.to_string());
        Ok(())
    }
}
