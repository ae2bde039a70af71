//! # Channel Pipeline
//!
//! Ordered list of named stages between the transport (head) and the game
//! logic (tail).
//!
//! ```text
//!  head                                                      tail
//!   │ decoder ─ packettap_inbound ─ encoder ─ packettap_outbound ─ game │
//!   │ ──────────────────────── inbound ───────────────────────────────> │
//!   │ <─────────────────────── outbound ─────────────────────────────── │
//! ```
//!
//! # Thread Safety
//!
//! The stage list is published as an immutable snapshot (read-copy-update).
//! A message in flight keeps the snapshot it started with, so inserting or
//! removing a stage never drops or duplicates it; the change applies to
//! the next message.

use crate::stage::Stage;
use packettap_core::{Result, TapError};
use parking_lot::RwLock;
use std::sync::Arc;

/// A stage and the name it is registered under
#[derive(Clone)]
pub struct NamedStage {
    pub name: String,
    pub stage: Arc<dyn Stage>,
}

impl std::fmt::Debug for NamedStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Copy-on-write list of named stages
#[derive(Default)]
pub struct Pipeline {
    stages: RwLock<Arc<Vec<NamedStage>>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current stage list; unaffected by later mutations
    pub fn snapshot(&self) -> Arc<Vec<NamedStage>> {
        self.stages.read().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.snapshot().iter().map(|s| s.name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.stages.read().iter().position(|s| s.name == name)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Stage>> {
        self.stages
            .read()
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.stage.clone())
    }

    pub fn len(&self) -> usize {
        self.stages.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.read().is_empty()
    }

    pub fn add_first(&self, name: &str, stage: Arc<dyn Stage>) -> Result<()> {
        self.update(|stages| {
            ensure_unique(stages, name)?;
            stages.insert(0, named(name, stage));
            Ok(())
        })
    }

    pub fn add_last(&self, name: &str, stage: Arc<dyn Stage>) -> Result<()> {
        self.update(|stages| {
            ensure_unique(stages, name)?;
            stages.push(named(name, stage));
            Ok(())
        })
    }

    /// Insert `name` directly before `base` (towards the head)
    pub fn add_before(&self, base: &str, name: &str, stage: Arc<dyn Stage>) -> Result<()> {
        self.update(|stages| {
            ensure_unique(stages, name)?;
            let index = find(stages, base)?;
            stages.insert(index, named(name, stage));
            Ok(())
        })
    }

    /// Insert `name` directly after `base` (towards the tail)
    pub fn add_after(&self, base: &str, name: &str, stage: Arc<dyn Stage>) -> Result<()> {
        self.update(|stages| {
            ensure_unique(stages, name)?;
            let index = find(stages, base)?;
            stages.insert(index + 1, named(name, stage));
            Ok(())
        })
    }

    /// Remove a stage, returning it if it was present
    pub fn remove(&self, name: &str) -> Option<Arc<dyn Stage>> {
        let mut removed = None;
        let _ = self.update(|stages| {
            let index = find(stages, name)?;
            removed = Some(stages.remove(index).stage);
            Ok(())
        });
        removed
    }

    /// Swap the stage `old` for `stage` registered as `name`, keeping its position
    pub fn replace(&self, old: &str, name: &str, stage: Arc<dyn Stage>) -> Result<Arc<dyn Stage>> {
        let mut replaced = None;
        self.update(|stages| {
            let index = find(stages, old)?;
            if name != old {
                ensure_unique(stages, name)?;
            }
            let previous = std::mem::replace(&mut stages[index], named(name, stage));
            replaced = Some(previous.stage);
            Ok(())
        })?;
        replaced.ok_or_else(|| TapError::NotFound(format!("stage {}", old)))
    }

    fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Vec<NamedStage>) -> Result<()>,
    {
        let mut guard = self.stages.write();
        let mut next = guard.as_ref().clone();
        f(&mut next)?;
        *guard = Arc::new(next);
        Ok(())
    }
}

fn named(name: &str, stage: Arc<dyn Stage>) -> NamedStage {
    NamedStage {
        name: name.to_string(),
        stage,
    }
}

fn find(stages: &[NamedStage], name: &str) -> Result<usize> {
    stages
        .iter()
        .position(|s| s.name == name)
        .ok_or_else(|| TapError::NotFound(format!("stage {}", name)))
}

fn ensure_unique(stages: &[NamedStage], name: &str) -> Result<()> {
    if stages.iter().any(|s| s.name == name) {
        return Err(TapError::InvalidData(format!("Duplicate stage name {}", name)));
    }
    Ok(())
}
