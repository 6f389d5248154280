//! Control-plane access: client trait, wire types, HTTP implementation.

pub mod client;
#[cfg(test)]
pub mod fake;
pub mod http;
pub mod types;

pub use client::CloudClient;
pub use http::HttpCloudClient;
pub use types::{
    CreateChangeSetRequest, CreateStackRequest, KeyPairInfo, KeyPairMaterial, RemoteChangeSet,
    RemoteChangeSetStatus, StackDescription, StackEvent, StackOutput, CAPABILITY_NAMED_IDENTITY,
};
