use twinguard_core_types::AuthorizationContext;

/// A cached lookup result. Absence is a first-class, cacheable value so that
/// repeated lookups of a missing record do not hit the authoritative store.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CacheEntry<V> {
    Exists {
        value: V,
        context: Option<AuthorizationContext>,
    },
    Nonexistent,
}

impl<V> CacheEntry<V> {
    pub fn exists(value: V) -> Self {
        Self::Exists {
            value,
            context: None,
        }
    }

    pub fn exists_with_context(value: V, context: AuthorizationContext) -> Self {
        Self::Exists {
            value,
            context: Some(context),
        }
    }

    pub fn nonexistent() -> Self {
        Self::Nonexistent
    }

    pub fn is_existent(&self) -> bool {
        matches!(self, Self::Exists { .. })
    }

    pub fn value(&self) -> Option<&V> {
        match self {
            Self::Exists { value, .. } => Some(value),
            Self::Nonexistent => None,
        }
    }

    pub fn context(&self) -> Option<&AuthorizationContext> {
        match self {
            Self::Exists { context, .. } => context.as_ref(),
            Self::Nonexistent => None,
        }
    }

    pub fn into_value(self) -> Option<V> {
        match self {
            Self::Exists { value, .. } => Some(value),
            Self::Nonexistent => None,
        }
    }
}
