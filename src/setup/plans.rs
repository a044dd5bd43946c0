//! Static plan price table.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Plan used when the draft has none.
pub const DEFAULT_PLAN: &str = "starter";
/// Price charged for plans missing from the table.
pub const DEFAULT_PRICE: Decimal = dec!(29);
pub const BILLING_CYCLE: &str = "monthly";

/// Monthly price per plan, USD.
static PLAN_PRICES: &[(&str, Decimal)] = &[
    ("starter", dec!(29)),
    ("professional", dec!(79)),
    ("business", dec!(149)),
    ("enterprise", dec!(299)),
];

/// A plan name resolved against the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPlan {
    pub plan_name: String,
    pub price: Decimal,
    /// False when the name was not in the table and the default price applies.
    pub known: bool,
}

/// Resolve a plan name. Unknown names keep their name and get the default price.
pub fn resolve_plan(plan: Option<&str>) -> ResolvedPlan {
    let plan_name = plan
        .map(|p| p.trim().to_ascii_lowercase())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| DEFAULT_PLAN.to_string());

    match PLAN_PRICES.iter().find(|(name, _)| *name == plan_name) {
        Some((_, price)) => ResolvedPlan {
            plan_name,
            price: *price,
            known: true,
        },
        None => ResolvedPlan {
            plan_name,
            price: DEFAULT_PRICE,
            known: false,
        },
    }
}
