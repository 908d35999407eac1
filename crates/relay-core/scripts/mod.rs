//! Server-side atomic scripts. One file per script, each compiled once via
//! `lazy_static!` and exposed through a small struct with a `run()` method,
//! mirroring the rest of this codebase's existing script wrappers.

mod dangling_locks;
mod delete_single;
mod enqueue_unique;
mod fetch;
mod promote;
mod reap_locks;
mod reenqueue;
mod release;
mod requeue_dead;
mod unknown_pools;

pub use dangling_locks::RemoveDanglingLocksScript;
pub use delete_single::DeleteSingleScript;
pub use enqueue_unique::{EnqueueOutcome, EnqueueUniqueInScript, EnqueueUniqueScript};
pub use fetch::{FetchCandidate, FetchResult, FetchScript};
pub use promote::{PromoteOutcome, PromoteScript};
pub use reap_locks::ReapStaleLocksScript;
pub use reenqueue::{ReenqueueCandidate, ReenqueueResult, ReenqueueScript};
pub use release::ReleaseScript;
pub use requeue_dead::{RequeueAllDeadScript, RequeueSingleDeadScript};
pub use unknown_pools::GetUnknownPoolsScript;
