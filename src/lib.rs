//! Role-gated approval workflow for loan, purchase and export slips.
//!
//! A [`workflow::Workflow`] is parameterised by a [`topology::Topology`]
//! (the fixed approval chain), a [`store::SlipStore`], a
//! [`roles::RoleAuthority`] and a [`notify::NotificationDispatcher`].
pub mod audit;
pub mod config;
pub mod directory;
pub mod error;
pub mod logging;
pub mod notify;
pub mod query;
pub mod reminders;
pub mod roles;
pub mod slip;
pub mod store;
pub mod topology;
pub mod utils;
pub mod workflow;
