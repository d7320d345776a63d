//! Status-to-phase classification for the order board.
//!
//! An order's fine-grained `status` string is folded into one of a fixed set
//! of pipeline phases. Classification walks an ordered list of status groups
//! and the first group containing the status wins. Statuses that appear in no
//! group land in [`Phase::Completion`], so the mapping is total.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category value that routes production statuses to the stock lane.
pub const STOCK_CATEGORY: &str = "estoque";

/// Coarse pipeline stage derived from an order's status and category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    AlmoxSsm,
    OrderGeneration,
    AlmoxGeneral,
    ProductionClient,
    ProductionStock,
    BalanceGeneration,
    Laboratory,
    Packaging,
    FreightQuote,
    ReadyToInvoice,
    Invoicing,
    Logistics,
    InTransit,
    Completion,
}

impl Phase {
    /// Every phase, in pipeline order.
    pub const ALL: [Phase; 14] = [
        Phase::AlmoxSsm,
        Phase::OrderGeneration,
        Phase::AlmoxGeneral,
        Phase::ProductionClient,
        Phase::ProductionStock,
        Phase::BalanceGeneration,
        Phase::Laboratory,
        Phase::Packaging,
        Phase::FreightQuote,
        Phase::ReadyToInvoice,
        Phase::Invoicing,
        Phase::Logistics,
        Phase::InTransit,
        Phase::Completion,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::AlmoxSsm => "almox_ssm",
            Phase::OrderGeneration => "order_generation",
            Phase::AlmoxGeneral => "almox_general",
            Phase::ProductionClient => "production_client",
            Phase::ProductionStock => "production_stock",
            Phase::BalanceGeneration => "balance_generation",
            Phase::Laboratory => "laboratory",
            Phase::Packaging => "packaging",
            Phase::FreightQuote => "freight_quote",
            Phase::ReadyToInvoice => "ready_to_invoice",
            Phase::Invoicing => "invoicing",
            Phase::Logistics => "logistics",
            Phase::InTransit => "in_transit",
            Phase::Completion => "completion",
        }
    }

    /// Column title shown on the board.
    pub fn label(self) -> &'static str {
        match self {
            Phase::AlmoxSsm => "SSM Warehouse",
            Phase::OrderGeneration => "Order Generation",
            Phase::AlmoxGeneral => "General Warehouse",
            Phase::ProductionClient => "Production (Client)",
            Phase::ProductionStock => "Production (Stock)",
            Phase::BalanceGeneration => "Balance Generation",
            Phase::Laboratory => "Laboratory",
            Phase::Packaging => "Packaging",
            Phase::FreightQuote => "Freight Quote",
            Phase::ReadyToInvoice => "Ready to Invoice",
            Phase::Invoicing => "Invoicing",
            Phase::Logistics => "Logistics",
            Phase::InTransit => "In Transit",
            Phase::Completion => "Completion",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("Unknown phase: {s}"))
    }
}

// ---------------------------------------------------------------------------
// Status groups
// ---------------------------------------------------------------------------

const ALMOX_SSM_STATUSES: &[&str] = &[
    "almox_ssm_pending",
    "almox_ssm_received",
    "almox_ssm_in_review",
    "almox_ssm_approved",
];

const ORDER_GENERATION_STATUSES: &[&str] = &[
    "pending",
    "in_analysis",
    "awaiting_approval",
    "planned",
    "order_generation_pending",
    "order_in_creation",
    "order_generated",
];

const ALMOX_GENERAL_STATUSES: &[&str] = &[
    "almox_general_received",
    "almox_general_separating",
    "almox_general_ready",
];

/// Split into client/stock lanes by category.
const PRODUCTION_STATUSES: &[&str] = &[
    "separation_started",
    "in_production",
    "awaiting_material",
    "separation_completed",
    "production_completed",
];

const BALANCE_GENERATION_STATUSES: &[&str] =
    &["balance_calculated", "balance_review", "balance_approved"];

const LABORATORY_STATUSES: &[&str] = &["awaiting_lab", "in_lab_analysis", "lab_completed"];

const PACKAGING_STATUSES: &[&str] = &["in_quality_check", "in_packaging", "ready_for_shipping"];

const FREIGHT_QUOTE_STATUSES: &[&str] = &[
    "freight_quote_requested",
    "freight_quote_received",
    "freight_approved",
];

const READY_TO_INVOICE_STATUSES: &[&str] = &["ready_to_invoice", "pending_invoice_request"];

const INVOICING_STATUSES: &[&str] = &[
    "invoice_requested",
    "awaiting_invoice",
    "invoice_issued",
    "invoice_sent",
];

const LOGISTICS_STATUSES: &[&str] = &[
    "released_for_shipping",
    "in_expedition",
    "pickup_scheduled",
    "awaiting_pickup",
];

const IN_TRANSIT_STATUSES: &[&str] = &["in_transit", "collected"];

/// Statuses that explicitly close an order. Anything unmapped lands in the
/// same phase.
const COMPLETION_STATUSES: &[&str] = &["delivered", "completed", "cancelled"];

/// Groups with a fixed target phase, checked in order after the production
/// special case has been placed at its slot.
const FIXED_GROUPS_BEFORE_PRODUCTION: &[(&[&str], Phase)] = &[
    (ALMOX_SSM_STATUSES, Phase::AlmoxSsm),
    (ORDER_GENERATION_STATUSES, Phase::OrderGeneration),
    (ALMOX_GENERAL_STATUSES, Phase::AlmoxGeneral),
];

const FIXED_GROUPS_AFTER_PRODUCTION: &[(&[&str], Phase)] = &[
    (BALANCE_GENERATION_STATUSES, Phase::BalanceGeneration),
    (LABORATORY_STATUSES, Phase::Laboratory),
    (PACKAGING_STATUSES, Phase::Packaging),
    (FREIGHT_QUOTE_STATUSES, Phase::FreightQuote),
    (READY_TO_INVOICE_STATUSES, Phase::ReadyToInvoice),
    (INVOICING_STATUSES, Phase::Invoicing),
    (LOGISTICS_STATUSES, Phase::Logistics),
    (IN_TRANSIT_STATUSES, Phase::InTransit),
];

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Map a raw order status (and optional category) to its pipeline phase.
///
/// Never fails: unknown statuses resolve to [`Phase::Completion`].
pub fn classify_phase(status: &str, category: Option<&str>) -> Phase {
    for (statuses, phase) in FIXED_GROUPS_BEFORE_PRODUCTION {
        if statuses.contains(&status) {
            return *phase;
        }
    }

    if PRODUCTION_STATUSES.contains(&status) {
        return if category == Some(STOCK_CATEGORY) {
            Phase::ProductionStock
        } else {
            Phase::ProductionClient
        };
    }

    for (statuses, phase) in FIXED_GROUPS_AFTER_PRODUCTION {
        if statuses.contains(&status) {
            return *phase;
        }
    }

    Phase::Completion
}

/// Whether two statuses fall in the same phase under the same category.
pub fn is_same_phase(status1: &str, status2: &str, category: Option<&str>) -> bool {
    classify_phase(status1, category) == classify_phase(status2, category)
}

/// Every status string the classifier knows about, in table order.
pub fn known_statuses() -> Vec<&'static str> {
    FIXED_GROUPS_BEFORE_PRODUCTION
        .iter()
        .map(|(statuses, _)| *statuses)
        .chain(std::iter::once(PRODUCTION_STATUSES))
        .chain(FIXED_GROUPS_AFTER_PRODUCTION.iter().map(|(s, _)| *s))
        .chain(std::iter::once(COMPLETION_STATUSES))
        .flat_map(|statuses| statuses.iter().copied())
        .collect()
}
