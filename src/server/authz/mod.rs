//! Policy based authorization.
//!
//! Every request is checked against stored `(subject, object, action)`
//! tuples. Subjects and objects are named by [`uri::ResourceUri`], actions by
//! [`action::AuthorizationAction`]. Permission tuples (`p`) grant actions,
//! grouping tuples (`g`) make subjects members of roles. Anything not granted
//! is denied.

pub mod action;
pub mod client;
pub mod config;
pub mod enforcer;
pub mod errors;
pub mod matcher;
pub mod policy;
pub mod store;
pub mod uri;
