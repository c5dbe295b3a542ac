//! Application services and ports.

#![forbid(unsafe_code)]

mod coordination_ports;
mod lock_service;

pub use coordination_ports::{
    GuardedResource, LockStore, Mutation, StoreEndpoint, StoreOpKind, StoreOpRequest,
    StoreOpResponse,
};
pub use lock_service::{
    FencingTokenAllocator, LockClientConfig, QuorumLockClient, RetryBackoffPolicy,
    SingleNodeLockClient,
};
