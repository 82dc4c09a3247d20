//! Test suites for the kindle kernel.

mod support;
mod unit;
