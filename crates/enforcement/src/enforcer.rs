use std::collections::HashSet;
use std::sync::Arc;

use twinguard_core_types::AuthorizationContext;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Permission {
    Read,
    Write,
}

/// Compiled in-memory structure answering "does this authorization context
/// hold the permission" for one policy. The compilation itself happens in
/// the authoritative store's loader; enforcement only consults the result.
pub trait Enforcer: Send + Sync + std::fmt::Debug {
    fn has_permission(&self, ctx: &AuthorizationContext, permission: Permission) -> bool;
}

pub type SharedEnforcer = Arc<dyn Enforcer>;

/// Straightforward subject-set enforcer used by loaders and tests.
#[derive(Clone, Debug, Default)]
pub struct CompiledEnforcer {
    read: HashSet<String>,
    write: HashSet<String>,
}

impl CompiledEnforcer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant_read(mut self, subject: impl Into<String>) -> Self {
        self.read.insert(subject.into());
        self
    }

    pub fn grant_write(mut self, subject: impl Into<String>) -> Self {
        let subject = subject.into();
        self.read.insert(subject.clone());
        self.write.insert(subject);
        self
    }

    pub fn shared(self) -> SharedEnforcer {
        Arc::new(self)
    }
}

impl Enforcer for CompiledEnforcer {
    fn has_permission(&self, ctx: &AuthorizationContext, permission: Permission) -> bool {
        let granted = match permission {
            Permission::Read => &self.read,
            Permission::Write => &self.write,
        };
        ctx.subjects.iter().any(|subject| granted.contains(subject))
    }
}
