mod authn;
mod authz;
mod db;
mod endpoints;
mod password;
mod response;

pub mod config;
pub mod factory;
pub mod restful;
