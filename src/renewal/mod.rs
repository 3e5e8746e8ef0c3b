//! Manual session renewal
//!
//! `policy` decides when renewal is allowed, `renewer` performs it.

pub mod policy;
pub mod renewer;

pub use policy::{RenewEligibility, RenewGate, can_renew, can_renew_with};
pub use renewer::{RenewalError, Renewer};
