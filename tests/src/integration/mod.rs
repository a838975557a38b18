//! # Integration Suites
//!
//! Scenarios that cross crate boundaries: modules talking over the bus,
//! bindings following their owner's lifetime, and context resolution inside
//! a mounted host.

pub mod binding_lifecycle;
pub mod bus_flows;
