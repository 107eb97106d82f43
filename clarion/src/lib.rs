#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]
#![doc = include_str!("../README.md")]
//!
//! # Threading Notes
//!
//! Everything here is `!Send` and `!Sync`. Registries are never borrowed while a handler or hook
//! runs, so handlers may connect and disconnect re-entrantly. Such changes apply from the next
//! notification on.

mod args;
mod error;
mod executor;
mod external;
mod handler;
mod hooks;
mod options;
mod results;
mod scope;
mod signal;
mod value;

pub mod class;
pub mod weak;

pub use args::{Args, Bound, Keywords, Param, ParamKind, Params};
pub use class::{Class, ClassBuilder, DeclaredHandlers, HandlerConfig, Placement};
pub use error::{BindError, BoxError, SignalError};
pub use executor::Executor;
pub use external::{ClassSignaller, ExternalSignaller};
pub use handler::{Deferred, Handler, HandlerResult, Method, Outcome, Subscriber, SubscriberKey};
pub use hooks::{ConnectHook, Connection, Notification, NotifyHook, Validation};
pub use options::{Context, NotifyOptions, SignalOptions, SortMode};
pub use results::MultipleResults;
pub use scope::InstanceScope;
pub use signal::Signal;
pub use value::Value;

pub use clarion_runtime::runtime;
