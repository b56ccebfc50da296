//! vscope Simulator
//!
//! Drives many concurrent requests through `ContextManager`s sharing one
//! application scope and session registry, and reports isolation or
//! teardown violations.

#![warn(unreachable_pub)]

pub mod simulator;

pub use simulator::{
    plan_requests, run_simulator, Handler, RequestSpec, SimulatorConfig, SimulatorReport,
    SimulatorStats,
};
