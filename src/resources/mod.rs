//! Typed builders for the CloudFormation resources the stacks need.
//! Anything used only once is written inline in its stack with
//! [`crate::template::Raw`] instead.

pub use serde_json::{json, Value};

pub use crate::intrinsics::*;
pub use crate::template::CfnResource;

mod acm;
pub use acm::*;
mod cloudfront;
pub use cloudfront::*;
mod iam;
pub use iam::*;
mod lambda;
pub use lambda::*;
mod logs;
pub use logs::*;
mod route53;
pub use route53::*;
mod s3_bucket;
pub use s3_bucket::*;
mod security_group;
pub use security_group::*;
mod waf;
pub use waf::*;
