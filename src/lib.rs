//! OLT: Operator Lifecycle Toolkit
//!
//! Resolves division workflows, credential requirements, compliance and
//! auto-advance eligibility over plain-text record collections, and keeps
//! stage orders dense while they are edited.

pub mod cli;
pub mod core;
pub mod entities;
pub mod store;
pub mod yaml;
