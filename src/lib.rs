//! Session planning for the training academy.
//!
//! A session draft is validated into a [`models::SchedulingRequest`], sent to
//! the external solver, and the returned [`proposal::Proposal`] is reviewed
//! through [`workflow::PlanningWorkflow`] before being persisted.

pub mod builder;
pub mod calendar;
pub mod config;
pub mod db;
pub mod error;
pub mod memory;
pub mod models;
pub mod notify;
pub mod proposal;
pub mod report;
pub mod repository;
pub mod solver;
pub mod workflow;
