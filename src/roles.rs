//! Role-to-phase access table.
//!
//! Each role owns a closed set of phases plus view/edit/delete flags. Only
//! `admin` is listed against every phase; nothing is inherited. Unknown roles
//! are denied everything.

use std::collections::BTreeSet;

use crate::phase::Phase;

/// Access granted to a single role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleAccess {
    pub phases: &'static [Phase],
    pub can_view: bool,
    pub can_edit: bool,
    pub can_delete: bool,
}

impl RoleAccess {
    fn covers(&self, phase: Phase) -> bool {
        self.phases.contains(&phase)
    }
}

const fn operator(phases: &'static [Phase]) -> RoleAccess {
    RoleAccess {
        phases,
        can_view: true,
        can_edit: true,
        can_delete: false,
    }
}

const ROLE_ACCESS: &[(&str, RoleAccess)] = &[
    (
        "admin",
        RoleAccess {
            phases: &Phase::ALL,
            can_view: true,
            can_edit: true,
            can_delete: true,
        },
    ),
    ("almox_ssm", operator(&[Phase::AlmoxSsm])),
    ("order_generation", operator(&[Phase::OrderGeneration])),
    ("almox_general", operator(&[Phase::AlmoxGeneral])),
    ("production_client", operator(&[Phase::ProductionClient])),
    ("production_stock", operator(&[Phase::ProductionStock])),
    ("balance_generation", operator(&[Phase::BalanceGeneration])),
    ("laboratory", operator(&[Phase::Laboratory])),
    ("packaging", operator(&[Phase::Packaging])),
    ("freight_quote", operator(&[Phase::FreightQuote])),
    ("ready_to_invoice", operator(&[Phase::ReadyToInvoice])),
    ("invoicing", operator(&[Phase::Invoicing])),
    ("logistics", operator(&[Phase::Logistics, Phase::InTransit])),
    (
        "commercial",
        RoleAccess {
            phases: &[
                Phase::OrderGeneration,
                Phase::FreightQuote,
                Phase::ReadyToInvoice,
                Phase::Invoicing,
                Phase::Logistics,
                Phase::InTransit,
                Phase::Completion,
            ],
            can_view: true,
            can_edit: false,
            can_delete: false,
        },
    ),
];

/// Look up a role's access entry.
pub fn role_access(role: &str) -> Option<&'static RoleAccess> {
    ROLE_ACCESS
        .iter()
        .find(|(name, _)| *name == role)
        .map(|(_, access)| access)
}

/// Names of every role in the table.
pub fn known_roles() -> impl Iterator<Item = &'static str> {
    ROLE_ACCESS.iter().map(|(name, _)| *name)
}

/// Union of the phase sets of all given roles. Unknown roles add nothing.
pub fn get_phases_for_roles<S: AsRef<str>>(roles: &[S]) -> BTreeSet<Phase> {
    roles
        .iter()
        .filter_map(|role| role_access(role.as_ref()))
        .flat_map(|access| access.phases.iter().copied())
        .collect()
}

pub fn can_role_view_phase(role: &str, phase: Phase) -> bool {
    role_access(role).is_some_and(|a| a.covers(phase) && a.can_view)
}

pub fn can_role_edit_phase(role: &str, phase: Phase) -> bool {
    role_access(role).is_some_and(|a| a.covers(phase) && a.can_edit)
}

pub fn can_role_delete_phase(role: &str, phase: Phase) -> bool {
    role_access(role).is_some_and(|a| a.covers(phase) && a.can_delete)
}

/// True if any of `roles` may view `phase`.
pub fn can_roles_view_phase<S: AsRef<str>>(roles: &[S], phase: Phase) -> bool {
    roles.iter().any(|r| can_role_view_phase(r.as_ref(), phase))
}

/// True if any of `roles` may edit `phase`.
pub fn can_roles_edit_phase<S: AsRef<str>>(roles: &[S], phase: Phase) -> bool {
    roles.iter().any(|r| can_role_edit_phase(r.as_ref(), phase))
}

/// True if any of `roles` may delete orders in `phase`.
pub fn can_roles_delete_phase<S: AsRef<str>>(roles: &[S], phase: Phase) -> bool {
    roles.iter().any(|r| can_role_delete_phase(r.as_ref(), phase))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_has_full_access() {
        for phase in Phase::ALL {
            assert!(can_role_view_phase("admin", phase));
            assert!(can_role_edit_phase("admin", phase));
            assert!(can_role_delete_phase("admin", phase));
        }
    }

    #[test]
    fn only_admin_holds_every_phase() {
        for role in known_roles() {
            let phases = get_phases_for_roles(&[role]);
            if role == "admin" {
                assert_eq!(phases.len(), Phase::ALL.len());
            } else {
                assert!(phases.len() < Phase::ALL.len(), "{role} holds every phase");
            }
        }
    }

    #[test]
    fn operator_roles_are_scoped() {
        assert!(can_role_view_phase("laboratory", Phase::Laboratory));
        assert!(can_role_edit_phase("laboratory", Phase::Laboratory));
        assert!(!can_role_delete_phase("laboratory", Phase::Laboratory));
        assert!(!can_role_view_phase("laboratory", Phase::Packaging));
    }

    #[test]
    fn unknown_role_fails_closed() {
        for phase in Phase::ALL {
            assert!(!can_role_view_phase("intern", phase));
            assert!(!can_role_edit_phase("intern", phase));
            assert!(!can_role_delete_phase("intern", phase));
        }
        assert!(get_phases_for_roles(&["intern"]).is_empty());
    }

    #[test]
    fn phases_union_across_roles() {
        let phases = get_phases_for_roles(&["almox_ssm", "laboratory"]);
        assert_eq!(
            phases,
            BTreeSet::from([Phase::AlmoxSsm, Phase::Laboratory])
        );

        let with_unknown = get_phases_for_roles(&["logistics", "nobody"]);
        assert_eq!(
            with_unknown,
            BTreeSet::from([Phase::Logistics, Phase::InTransit])
        );
    }

    #[test]
    fn commercial_is_read_only() {
        assert!(can_role_view_phase("commercial", Phase::Invoicing));
        assert!(!can_role_edit_phase("commercial", Phase::Invoicing));
        assert!(!can_role_view_phase("commercial", Phase::Laboratory));
    }

    #[test]
    fn role_sets_grant_if_any_member_grants() {
        let roles = vec!["commercial".to_string(), "invoicing".to_string()];
        assert!(can_roles_edit_phase(&roles, Phase::Invoicing));
        assert!(!can_roles_edit_phase(&roles, Phase::FreightQuote));
        assert!(can_roles_view_phase(&roles, Phase::FreightQuote));
        assert!(!can_roles_delete_phase(&roles, Phase::Invoicing));
    }
}
