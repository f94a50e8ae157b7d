//! Token-Budget Reducer: keep the chunks that fit the source budget.

use tracing::{debug, info};

use sourcescout_shared::{BudgetContext, Chunk, CountTokens, SelectionPolicy};

/// Accepted chunks plus the numbers behind the decision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReduceOutcome {
    pub accepted: Vec<Chunk>,
    pub budget: usize,
    pub tokens_used: usize,
    /// Chunks not accepted.
    pub rejected: usize,
}

/// Walk `chunks` in order, charging each its rendered token cost.
///
/// Under [`SelectionPolicy::StrictPrefix`] the first chunk that does not fit
/// ends the walk, so the result is always a prefix of the input. Under
/// [`SelectionPolicy::BestEffort`] oversized chunks are skipped and later
/// ones still get a chance. Both are deterministic.
pub fn reduce(
    chunks: Vec<Chunk>,
    budget: &BudgetContext,
    counter: &dyn CountTokens,
    policy: SelectionPolicy,
) -> ReduceOutcome {
    let limit = budget.source_token_budget();
    let total = chunks.len();
    let mut accepted = Vec::new();
    let mut used = 0usize;

    for chunk in chunks {
        let cost = counter.count(&chunk.render());
        if used + cost <= limit {
            used += cost;
            accepted.push(chunk);
            continue;
        }

        debug!(url = %chunk.url, order = chunk.order, cost, used, limit, "chunk exceeds remaining budget");
        if policy == SelectionPolicy::StrictPrefix {
            break;
        }
    }

    let rejected = total - accepted.len();
    info!(
        budget = limit,
        tokens_used = used,
        accepted = accepted.len(),
        rejected,
        ?policy,
        "token budget applied"
    );

    ReduceOutcome {
        accepted,
        budget: limit,
        tokens_used: used,
        rejected,
    }
}
