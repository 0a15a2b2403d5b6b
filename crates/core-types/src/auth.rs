use serde::{Deserialize, Serialize};

/// Authorization subjects attached to an in-flight signal.
///
/// The concrete permission evaluation against these subjects happens in the
/// per-signal enforcement rules; this core only carries the context along and
/// re-attaches it when an out-of-band response is correlated back.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationContext {
    pub subjects: Vec<String>,
}

impl AuthorizationContext {
    pub fn new(subjects: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            subjects: subjects.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}
