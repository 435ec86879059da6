const RESERVED_SPELLINGS: [&str; 4] = ["super-admin", "superadmin", "super_admin", "super admin"];

/// True when `name` is any spelling of the top-tier role.
///
/// Matches the lower-cased, trimmed name exactly against the reserved
/// spellings and also rejects any name that contains one of them, so
/// "Team Super Admin Support" is reserved while "Admin" is not.
pub fn is_reserved_role_name(name: &str) -> bool {
    let normalized = name.trim().to_lowercase();
    RESERVED_SPELLINGS
        .iter()
        .any(|reserved| normalized == *reserved || normalized.contains(reserved))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_spelling_is_reserved() {
        for name in ["Super-Admin", "SUPERADMIN", "super_admin", "Super Admin", "  super-admin  "] {
            assert!(is_reserved_role_name(name), "{name} should be reserved");
        }
    }

    #[test]
    fn names_containing_a_spelling_are_reserved() {
        assert!(is_reserved_role_name("Team Super Admin Support"));
        assert!(is_reserved_role_name("regional-superadmin"));
    }

    #[test]
    fn ordinary_roles_are_not_reserved() {
        for name in ["Admin", "Manager", "Super Agent", "super-visor", "Superb Admin"] {
            assert!(!is_reserved_role_name(name), "{name} should be allowed");
        }
    }
}
