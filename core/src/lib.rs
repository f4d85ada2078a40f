//! Concurrency-and-resource bridge between a synchronous request surface and
//! a host development environment's asynchronous operations.
//!
//! The pieces: per-class [`op_lock`] gates, the [`dispatch`] completion
//! bridge onto the single application context, the [`run_registry`] of
//! tracked processes with bounded [`output_buffer`] capture, bounded-retry
//! [`test_report`] extraction, and the [`debug`] facade. [`service`] wires
//! them together and [`api`] maps them onto the wire contracts.

pub mod api;
pub mod config;
pub mod debug;
pub mod dispatch;
pub mod error;
pub mod host;
pub mod op_lock;
mod operations;
pub mod output_buffer;
pub mod result_cache;
pub mod run_registry;
pub mod service;
pub mod test_report;

pub use config::BridgeConfig;
pub use debug::DebugFacade;
pub use debug::DebugHost;
pub use dispatch::AppContext;
pub use dispatch::Completion;
pub use dispatch::await_completion;
pub use error::BridgeError;
pub use error::Result;
pub use host::BuildHost;
pub use host::ProjectModel;
pub use host::TestHost;
pub use op_lock::OpClass;
pub use op_lock::OperationGate;
pub use op_lock::OperationLocks;
pub use output_buffer::OutputBuffer;
pub use run_registry::RunRegistry;
pub use service::BridgeService;
pub use service::HostSeams;
pub use test_report::RetryPolicy;
pub use test_report::TestNode;
