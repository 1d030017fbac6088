#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod gateway;
pub mod labels;
pub mod policy;

pub use self::labels::{Labels, Selector};
pub use k8s_openapi::api::{
    self,
    core::v1::{ConfigMap, Namespace, Secret, Service, ServicePort, ServiceSpec},
};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, Time};
pub use k8s_openapi::ByteString;
pub use kube::core::{ObjectMeta, Resource, ResourceExt};
