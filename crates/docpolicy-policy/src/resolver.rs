//! Priority based policy resolution

use docpolicy_core::{Error, PolicyTypeId, Result};
use std::collections::BTreeSet;
use tracing::debug;

use crate::Policy;

/// Resolve conflicting policies of a single policy type
///
/// Every policy at the numerically highest priority is returned, ordered by
/// policy id. Policies of more than one type are a caller contract violation
/// and fail with [`Error::MixedPolicyType`].
pub fn resolve_policies(policies: Vec<Policy>) -> Result<Vec<Policy>> {
    let type_ids: BTreeSet<PolicyTypeId> = policies.iter().map(|p| p.type_id).collect();
    if type_ids.len() > 1 {
        return Err(Error::MixedPolicyType(type_ids.into_iter().collect()));
    }

    let Some(top) = policies.iter().map(|p| p.priority).max() else {
        return Ok(Vec::new());
    };

    let total = policies.len();
    let mut resolved: Vec<Policy> = policies
        .into_iter()
        .filter(|p| p.priority == top)
        .collect();
    resolved.sort_by_key(|p| p.id);

    debug!(
        priority = top,
        kept = resolved.len(),
        dropped = total - resolved.len(),
        "Resolved policies by priority"
    );

    Ok(resolved)
}
