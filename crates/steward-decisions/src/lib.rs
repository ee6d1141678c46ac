//! Decision store: risk and policy decisions bound to the exact context that produced them.
//!
//! A decision answers "has this already been decided?" only while its
//! `contextHash` still matches and it has not expired. Anything else means the
//! question must be asked again.

pub mod index;
pub mod store;

pub use index::DecisionIndex;
pub use store::{
    context_hash, Decision, DecisionFile, DecisionStore, LookupOutcome, DECISION_RECORDED,
    DECISION_RENEWAL_REFUSED, DECISION_RENEWED, DECISION_WRITE_FAILED, MAX_RENEWALS,
};
