use crate::error::{CoreError, Result};

/// Identity asserted by the caller of a request, as extracted by the
/// (external) gateway auth middleware and forwarded to the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerContext {
    pub user_id: String,
    pub tenant_id: String,
    pub authenticated: bool,
}

impl CallerContext {
    pub fn new(user_id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            tenant_id: tenant_id.into(),
            authenticated: true,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            user_id: String::new(),
            tenant_id: String::new(),
            authenticated: false,
        }
    }

    pub fn require_authenticated(&self) -> Result<()> {
        if self.authenticated {
            Ok(())
        } else {
            Err(CoreError::Unauthenticated)
        }
    }
}

/// Enforces `memo.tenant == caller.tenant`, per P2: a mismatch MUST surface
/// as `NOT_FOUND`, never as a more specific "forbidden", to avoid leaking
/// that the resource exists at all.
pub fn enforce_tenant(caller: &CallerContext, memo_tenant: &str, resource: &str) -> Result<()> {
    if caller.tenant_id != memo_tenant {
        return Err(CoreError::not_found(resource));
    }
    Ok(())
}

/// Enforces `memo.user == caller.user` when the memo carries a user field.
/// Same leak-prevention rule as [`enforce_tenant`].
pub fn enforce_owner(caller: &CallerContext, memo_user: Option<&str>, resource: &str) -> Result<()> {
    if let Some(owner) = memo_user {
        if caller.user_id != owner {
            return Err(CoreError::not_found(resource));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_mismatch_is_not_found() {
        let caller = CallerContext::new("u1", "t1");
        let err = enforce_tenant(&caller, "t2", "task").unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn tenant_match_passes() {
        let caller = CallerContext::new("u1", "t1");
        assert!(enforce_tenant(&caller, "t1", "task").is_ok());
    }

    #[test]
    fn owner_mismatch_is_not_found() {
        let caller = CallerContext::new("u1", "t1");
        let err = enforce_owner(&caller, Some("u2"), "task").unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[test]
    fn owner_absent_passes() {
        let caller = CallerContext::new("u1", "t1");
        assert!(enforce_owner(&caller, None, "task").is_ok());
    }
}
