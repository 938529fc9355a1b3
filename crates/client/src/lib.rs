//! Client code for offgrid.
//!
//! This crate provides the network fetch client and the offline proxy built
//! on top of it: request routing, generation lifecycle and the control
//! channel. The server binary drives it through the runtime hooks.

pub mod fetch;
pub mod proxy;

pub use fetch::{FetchClient, FetchConfig, InterceptedRequest, Network, NetworkResponse, RequestMode, ResponseKind};

pub use proxy::{
    ControlMessage, Generation, Intercept, LifecycleState, OfflineProxy, ProxyResponse, ProxySettings, ProxyStatus,
    ResponseSource,
};
