//! Two-phase cache negotiation (stat/validate, then fetch).

pub mod negotiator;

pub use negotiator::{CacheDecision, CacheProbe, Negotiator, ServedContent};
