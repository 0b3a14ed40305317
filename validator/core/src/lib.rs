#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod authz;
pub mod clients;
pub mod cluster;
mod error;
pub mod identity;
pub mod network;
pub mod resource_id;
pub mod resources;
pub mod token;

pub use self::{
    error::{AuthorizerKind, CloudError, CloudErrorBody, ErrorCode, ErrorKind},
    network::Subnet,
    resource_id::ResourceId,
};
pub use ipnet::{IpNet, Ipv4Net, Ipv6Net};
