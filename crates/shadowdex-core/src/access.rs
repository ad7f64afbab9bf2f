//! Per-hit access decisions.
//!
//! A hit is visible when the user may see its course and the owning
//! adapter's capability predicate allows it. Administrators see everything.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::adapter::{Access, AccessRequest, AdapterRegistry};
use crate::index::EngineHit;
use crate::models::UserContext;

/// What to do when no capability predicate can decide.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityPolicy {
    /// Show the hit.
    #[default]
    FailOpen,
    /// Hide the hit.
    FailClosed,
}

impl CapabilityPolicy {
    pub fn allows(&self) -> bool {
        matches!(self, CapabilityPolicy::FailOpen)
    }
}

/// Course-level visibility.
#[async_trait]
pub trait CourseAccess: Send + Sync {
    async fn can_view(&self, user: &UserContext, course_id: i64) -> Result<bool>;
}

/// Every course is visible.
pub struct OpenCourses;

#[async_trait]
impl CourseAccess for OpenCourses {
    async fn can_view(&self, _user: &UserContext, _course_id: i64) -> Result<bool> {
        Ok(true)
    }
}

pub struct AccessGuard<'a> {
    registry: &'a AdapterRegistry,
    courses: &'a dyn CourseAccess,
    policy: CapabilityPolicy,
}

impl<'a> AccessGuard<'a> {
    pub fn new(registry: &'a AdapterRegistry, courses: &'a dyn CourseAccess) -> Self {
        Self {
            registry,
            courses,
            policy: CapabilityPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: CapabilityPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> CapabilityPolicy {
        self.policy
    }

    /// Whether `user` may see `hit`. Errors deny.
    pub async fn permits(&self, user: &UserContext, hit: &EngineHit) -> bool {
        if user.is_admin {
            return true;
        }

        match self.courses.can_view(user, hit.course_id).await {
            Ok(true) => {}
            Ok(false) => return false,
            Err(e) => {
                warn!(course_id = hit.course_id, "course access check failed: {:#}", e);
                return false;
            }
        }

        let Some(adapter) = self.registry.resolve(&hit.path, &hit.doc_type) else {
            warn!(
                doc_type = %hit.doc_type,
                path = %hit.path,
                "no adapter owns this hit; applying {:?}",
                self.policy
            );
            return self.policy.allows();
        };

        let req = AccessRequest {
            path: &hit.path,
            item_type: &hit.item_type,
            doc_id: &hit.doc_id,
            group_id: hit.group_id,
            context_id: hit.context_id,
        };
        match adapter.check_access(user, &req).await {
            Ok(Access::Allow) => true,
            Ok(Access::Deny) => false,
            Ok(Access::Unresolved) => {
                debug!(key = %hit.key(), "no capability predicate; applying {:?}", self.policy);
                self.policy.allows()
            }
            Err(e) => {
                warn!(key = %hit.key(), "capability check failed: {:#}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use crate::source::memory::{InMemoryAdapter, InMemorySource, SourceRow};
    use std::sync::Arc;

    struct NoCourse(i64);

    #[async_trait]
    impl CourseAccess for NoCourse {
        async fn can_view(&self, _user: &UserContext, course_id: i64) -> Result<bool> {
            Ok(course_id != self.0)
        }
    }

    fn hit(doc_type: &str, id: &str, course_id: i64) -> EngineHit {
        EngineHit::from_document(
            &Document {
                doc_id: id.into(),
                doc_type: doc_type.into(),
                item_type: "page".into(),
                course_id,
                path: doc_type.into(),
                ..Default::default()
            },
            1.0,
        )
    }

    fn registry(source: &Arc<InMemorySource>) -> AdapterRegistry {
        let mut reg = AdapterRegistry::new();
        let wiki = InMemoryAdapter::new("wiki", source.clone(), &[("page", None)]);
        wiki.deny("2");
        reg.register(Box::new(wiki));
        reg.register(Box::new(
            InMemoryAdapter::new("glossary", source.clone(), &[("page", None)]).without_predicate(),
        ));
        reg
    }

    #[tokio::test]
    async fn predicate_decides_and_owner_keeps_access() {
        let source = Arc::new(InMemorySource::new());
        let mut row = SourceRow::new("wiki", "2", "Private", 1);
        row.user_id = 7;
        source.upsert(row);
        let reg = registry(&source);
        let guard = AccessGuard::new(&reg, &OpenCourses);

        assert!(guard.permits(&UserContext::user(3), &hit("wiki", "1", 2)).await);
        assert!(!guard.permits(&UserContext::user(3), &hit("wiki", "2", 2)).await);
        assert!(guard.permits(&UserContext::user(7), &hit("wiki", "2", 2)).await);
        assert!(guard.permits(&UserContext::admin(1), &hit("wiki", "2", 2)).await);
    }

    #[tokio::test]
    async fn course_visibility_comes_first() {
        let source = Arc::new(InMemorySource::new());
        let reg = registry(&source);
        let courses = NoCourse(5);
        let guard = AccessGuard::new(&reg, &courses);

        assert!(!guard.permits(&UserContext::user(3), &hit("wiki", "1", 5)).await);
        assert!(guard.permits(&UserContext::admin(1), &hit("wiki", "1", 5)).await);
    }

    #[tokio::test]
    async fn unresolved_access_follows_policy() {
        let source = Arc::new(InMemorySource::new());
        let reg = registry(&source);
        let user = UserContext::user(3);

        let open = AccessGuard::new(&reg, &OpenCourses);
        assert!(open.permits(&user, &hit("glossary", "1", 2)).await);
        assert!(open.permits(&user, &hit("retired", "1", 2)).await);

        let closed = AccessGuard::new(&reg, &OpenCourses).with_policy(CapabilityPolicy::FailClosed);
        assert!(!closed.permits(&user, &hit("glossary", "1", 2)).await);
        assert!(!closed.permits(&user, &hit("retired", "1", 2)).await);
        assert!(closed.permits(&user, &hit("wiki", "1", 2)).await);
    }
}
