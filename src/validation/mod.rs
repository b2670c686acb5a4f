//! Validation: grounding every persona claim in the evidence store.
//!
//! - [`support`] - lexical support scoring and citation checks
//! - [`validator`] - the validation pass and its result
//! - [`links`] - external link checks

pub mod links;
pub mod support;
pub mod validator;

pub use links::{is_well_formed, LinkChecker, DEFAULT_LINK_TIMEOUT};
pub use support::{assertion_agrees, citation_holds, score_support, SupportScore};
pub use validator::{ValidationResult, Validator, ValidatorConfig, DEFAULT_STRICTNESS};
