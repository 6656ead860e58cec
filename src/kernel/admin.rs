//! Authorization predicates the core consumes but does not define —
//! the actual admin grant/revoke workflow is out of scope.

/// Answers "is this external user id an admin" for the caller layer to
/// decide whether to bypass the ledger debit during admission.
pub trait AdminAuthority: Send + Sync {
    fn is_admin(&self, external_user_id: i64) -> bool;
}

/// Static-list implementation backed by `Config::admin_ids`.
pub struct StaticAdminList {
    admin_ids: Vec<i64>,
}

impl StaticAdminList {
    pub fn new(admin_ids: Vec<i64>) -> Self {
        Self { admin_ids }
    }
}

impl AdminAuthority for StaticAdminList {
    fn is_admin(&self, external_user_id: i64) -> bool {
        self.admin_ids.contains(&external_user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_listed_admin() {
        let list = StaticAdminList::new(vec![1001, 2002]);
        assert!(list.is_admin(1001));
        assert!(!list.is_admin(3003));
    }
}
