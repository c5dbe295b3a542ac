//! Ports for coordination stores and guarded resources.

mod guard;
mod store;
mod wire;

pub use guard::{GuardedResource, Mutation};
pub use store::{LockStore, StoreEndpoint};
pub use wire::{StoreOpKind, StoreOpRequest, StoreOpResponse};
