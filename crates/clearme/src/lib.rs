//! Student clearance tracking.
//!
//! Students submit a clearance request, each administrative department records a
//! verdict backed by an officer e-signature, and the completed set renders into the
//! institutional clearance form. External systems (a student-records backend and a
//! multi-party signing provider) are reached through the `integrations` module and
//! never participate in the approval rules themselves.

pub mod config;
pub mod error;
pub mod integrations;
pub mod telemetry;
pub mod workflows;
