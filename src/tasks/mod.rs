//! Background Tasks
//!
//! Periodic maintenance over both cache tiers and the on-demand store
//! optimization sequence.

mod maintenance;

pub use maintenance::{
    run_full_optimization, spawn_analysis_task, spawn_report_task, spawn_sweep_task,
    MaintenanceScheduler, OptimizationReport, StepResult,
};
