/// User id used when nobody is signed in (offline/prototype mode).
pub const DEFAULT_USER_ID: &str = "00000000-0000-0000-0000-000000000001";

/// Identity of the caller, passed explicitly into every registry call.
///
/// Local storage uses `user_id` as the scope of its partitions; the cloud
/// backend binds it into every statement so rows of other users are never
/// visible.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserContext {
    pub user_id: String,
    pub display_name: Option<String>,
}

impl UserContext {
    pub fn new(user_id: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        }
    }

    /// Context for an unauthenticated, single-device session.
    pub fn anonymous() -> Self {
        Self::new(DEFAULT_USER_ID, None)
    }

    /// Storage scope for local partitions.
    pub fn scope(&self) -> &str {
        &self.user_id
    }
}

impl Default for UserContext {
    fn default() -> Self {
        Self::anonymous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_user_id() {
        assert_eq!(DEFAULT_USER_ID, "00000000-0000-0000-0000-000000000001");
        assert_eq!(UserContext::anonymous().scope(), DEFAULT_USER_ID);
    }

    #[test]
    fn test_blank_display_name_is_dropped() {
        let ctx = UserContext::new("u-1", Some("   ".to_string()));
        assert_eq!(ctx.display_name, None);

        let ctx = UserContext::new("u-1", Some(" Sam Inspector ".to_string()));
        assert_eq!(ctx.display_name.as_deref(), Some("Sam Inspector"));
    }
}
