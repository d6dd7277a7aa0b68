// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-request context threaded through service calls.

use crate::task::Task;

/// Principal used when a request carries no credentials.
pub const ANONYMOUS: &str = "anonymous";

/// Principal allowed to access every task.
pub const ADMIN: &str = "admin";

/// Authenticated principal and correlation id for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// Caller identity.
    pub principal: String,
    /// Correlation id stamped onto every error raised for this request.
    pub trace_id: String,
}

impl RequestContext {
    /// Context for `principal`.
    pub fn new(principal: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            trace_id: trace_id.into(),
        }
    }

    /// Context for an unauthenticated caller.
    pub fn anonymous(trace_id: impl Into<String>) -> Self {
        Self::new(ANONYMOUS, trace_id)
    }

    /// `true` for the admin principal.
    pub fn is_admin(&self) -> bool {
        self.principal == ADMIN
    }

    /// Placeholder ownership check: the creator or the admin.
    pub fn can_access(&self, task: &Task) -> bool {
        self.is_admin() || task.created_by == self.principal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership() {
        let mut task = Task::titled("t");
        task.created_by = "alice".into();

        assert!(RequestContext::new("alice", "t1").can_access(&task));
        assert!(RequestContext::new(ADMIN, "t1").can_access(&task));
        assert!(!RequestContext::new("bob", "t1").can_access(&task));
        assert!(!RequestContext::anonymous("t1").can_access(&task));
    }
}
