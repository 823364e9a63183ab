//! aerofleet - A policy-driven distributed-object runtime
//!
//! Deploy application objects onto registered hosts, attach composable
//! policies (admission control, elastic scaling, two-phase commit), and
//! invoke them through location-transparent client handles.

pub mod object;
pub mod policy;
pub mod registry;
pub mod runtime;
pub mod timer;
