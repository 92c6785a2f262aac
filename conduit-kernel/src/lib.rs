#![deny(missing_docs)]
//! Plan interpreter and in-process invocation boundary.
//!
//! [`Kernel`] turns an [`ExecutionCommand`](stage0::ExecutionCommand) into
//! a final accumulated output. It never calls handlers directly: every
//! stage and merge goes through a [`StageInvoker`](stage0::StageInvoker),
//! which owns retries and timeouts. [`LocalInvoker`] is the in-process
//! implementation.
//!
//! ```text
//! command ──► validate ──► group 0 ──► group 1 ──► … ──► output
//!                            │            │
//!                       sequential      async ──► merge policy
//! ```

mod cancel;
pub mod hooks;
mod invoker;
mod kernel;
mod routing;

pub use cancel::CancelHandle;
pub use hooks::{HookAction, HookContext, HookError, HookPoint, HookRegistry, KernelHook};
pub use invoker::LocalInvoker;
pub use kernel::Kernel;
pub use routing::{QueueConfig, QueueIsolation};
