//! Sub-agent output types.

pub mod finding;

pub use finding::{Citation, Claim, ClaimId, Finding, RoleAssertion, TechRole, TechSignal};
