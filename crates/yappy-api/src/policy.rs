//! The visibility and moderation policy, in one place.
//!
//! Handlers derive a [`Viewer`] from the optional requester id and ask this
//! module what that viewer may do or see. No role check lives anywhere else.

use yappy_db::models::UserRow;

/// Who is asking. An id that resolves to no user row counts as anonymous.
#[derive(Debug, Clone)]
pub enum Viewer {
    Anonymous,
    Member(UserRow),
    Admin(UserRow),
}

impl Viewer {
    pub fn from_user(user: Option<UserRow>) -> Self {
        match user {
            None => Viewer::Anonymous,
            Some(u) if u.is_admin => Viewer::Admin(u),
            Some(u) => Viewer::Member(u),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Viewer::Admin(_))
    }
}

/// The viewer as a known user, admin or not.
pub fn member(viewer: &Viewer) -> Option<&UserRow> {
    match viewer {
        Viewer::Member(u) | Viewer::Admin(u) => Some(u),
        Viewer::Anonymous => None,
    }
}

/// The viewer as the admin.
pub fn admin(viewer: &Viewer) -> Option<&UserRow> {
    match viewer {
        Viewer::Admin(u) => Some(u),
        _ => None,
    }
}

/// Admin assignment: while no admin exists anyone may claim the role
/// (bootstrap); afterwards only the current admin may reassign it.
pub fn can_assign_admin(has_admin: bool, viewer: &Viewer) -> bool {
    !has_admin || viewer.is_admin()
}

/// Resetting the user directory follows the same bootstrap rule as admin
/// assignment.
pub fn can_reset_directory(has_admin: bool, viewer: &Viewer) -> bool {
    !has_admin || viewer.is_admin()
}

/// Which user's hidden set filters a message listing. The admin and
/// anonymous listings are unfiltered; the admin additionally sees
/// moderation state (see [`sees_moderation_state`]).
pub fn visibility_filter(viewer: &Viewer) -> Option<&str> {
    match viewer {
        Viewer::Member(u) => Some(u.id.as_str()),
        Viewer::Admin(_) | Viewer::Anonymous => None,
    }
}

/// Only the admin learns whether a message has been hidden by anyone,
/// never by whom.
pub fn sees_moderation_state(viewer: &Viewer) -> bool {
    viewer.is_admin()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, is_admin: bool) -> UserRow {
        UserRow {
            id: id.to_string(),
            name: id.to_string(),
            is_admin,
            created_at: "2025-01-01T00:00:00.000000Z".to_string(),
        }
    }

    #[test]
    fn viewer_derivation() {
        assert!(matches!(Viewer::from_user(None), Viewer::Anonymous));
        assert!(matches!(
            Viewer::from_user(Some(user("a", false))),
            Viewer::Member(_)
        ));
        assert!(matches!(
            Viewer::from_user(Some(user("a", true))),
            Viewer::Admin(_)
        ));
    }

    #[test]
    fn member_includes_admin() {
        assert!(member(&Viewer::Anonymous).is_none());
        assert!(member(&Viewer::from_user(Some(user("a", false)))).is_some());
        assert!(member(&Viewer::from_user(Some(user("a", true)))).is_some());
    }

    #[test]
    fn admin_is_admin_only() {
        assert!(admin(&Viewer::Anonymous).is_none());
        assert!(admin(&Viewer::from_user(Some(user("a", false)))).is_none());
        assert!(admin(&Viewer::from_user(Some(user("a", true)))).is_some());
    }

    #[test]
    fn admin_assignment_bootstraps() {
        let nobody = Viewer::Anonymous;
        let plain = Viewer::from_user(Some(user("a", false)));
        let boss = Viewer::from_user(Some(user("b", true)));

        // No admin yet: anyone may claim the role.
        assert!(can_assign_admin(false, &nobody));
        assert!(can_assign_admin(false, &plain));
        // Admin exists: only the admin reassigns.
        assert!(!can_assign_admin(true, &nobody));
        assert!(!can_assign_admin(true, &plain));
        assert!(can_assign_admin(true, &boss));
    }

    #[test]
    fn only_members_are_filtered() {
        let plain = Viewer::from_user(Some(user("a", false)));
        let boss = Viewer::from_user(Some(user("b", true)));

        assert_eq!(visibility_filter(&plain), Some("a"));
        assert_eq!(visibility_filter(&boss), None);
        assert_eq!(visibility_filter(&Viewer::Anonymous), None);
    }

    #[test]
    fn moderation_state_is_admin_only() {
        assert!(sees_moderation_state(&Viewer::from_user(Some(user("b", true)))));
        assert!(!sees_moderation_state(&Viewer::from_user(Some(user("a", false)))));
        assert!(!sees_moderation_state(&Viewer::Anonymous));
    }
}
