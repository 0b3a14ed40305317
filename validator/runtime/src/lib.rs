#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use admission_validator_core as core;
pub use admission_validator_dynamic as dynamic;

mod args;
mod validation;

pub use self::{
    args::{Args, LogFormat},
    validation::{cluster_subnets, ClusterValidation, Credentials, Validators},
};
