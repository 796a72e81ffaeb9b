//! Shared helpers for vantage tests and tooling.

pub mod port_allocator;
