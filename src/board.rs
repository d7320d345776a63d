//! Kanban board assembly.
//!
//! Orders are bucketed by phase into one column per phase the viewer's roles
//! can see, in pipeline order. Columns are emitted even when empty.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::db::{self, DbState};
use crate::error::Result;
use crate::models::Order;
use crate::phase::Phase;
use crate::profile_cache::ProfileCache;
use crate::roles;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardColumn {
    pub phase: Phase,
    pub label: &'static str,
    pub orders: Vec<Order>,
}

/// Build the columns visible to `viewer_roles`. Orders in hidden phases are
/// dropped.
pub fn build_board<S: AsRef<str>>(orders: Vec<Order>, viewer_roles: &[S]) -> Vec<BoardColumn> {
    let visible: BTreeSet<Phase> = Phase::ALL
        .into_iter()
        .filter(|phase| roles::can_roles_view_phase(viewer_roles, *phase))
        .collect();

    let mut columns: Vec<BoardColumn> = Phase::ALL
        .into_iter()
        .filter(|phase| visible.contains(phase))
        .map(|phase| BoardColumn {
            phase,
            label: phase.label(),
            orders: Vec::new(),
        })
        .collect();

    for order in orders {
        let phase = order.phase();
        if let Some(column) = columns.iter_mut().find(|c| c.phase == phase) {
            column.orders.push(order);
        }
    }

    columns
}

/// Load every order and build the board for a cached user.
///
/// Unknown users get an empty board.
pub fn board_for_user(
    state: &DbState,
    cache: &ProfileCache,
    user_id: &str,
) -> Result<Vec<BoardColumn>> {
    let Some(profile) = cache.get(user_id) else {
        return Ok(Vec::new());
    };
    let orders = db::list_orders(&*state.lock()?)?;
    Ok(build_board(orders, &profile.roles))
}
