//! AI Integration Module for MilestoneX
//!
//! Model invocation, prompt templates, and the layers that turn raw model
//! text into validated epics, milestones and allocations.

pub mod allocation;
pub mod client;
pub mod prompts;
pub mod reconcile;
pub mod responses;
pub mod stub;

pub use allocation::{reconcile_allocation, reconcile_allocation_values};
pub use client::{AiClient, AiError, AiMode, ModelAdapter};
pub use reconcile::{
    EntityKind, ReconcileReport, ReconciliationDefault, Reconciler, TimelineLimits,
    ValidationRejection,
};
pub use responses::{parse, parse_with, ParseFailure, ResponseShape};
pub use stub::StubModel;
