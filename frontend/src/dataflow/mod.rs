//! Core dataflow primitives for reactive view state
//!
//! This module holds the building blocks every dashboard view model is made
//! of. None of them know anything about energy data or HTTP.
//!
//! # Core Components
//!
//! - **[`Runtime`]** - Owner of the reactive graph, batching and settling
//! - **[`Atom`]** - Single mutable observable value
//! - **[`Derived`]** - Memoized pure view over atoms and other views
//! - **[`Effect`]** - Side effect re-run when its inputs change
//! - **[`Relay`]** - Single-source event channel
//! - **[`Task`]** / **[`AutoRefresh`]** - Local async tasks torn down on drop
//!
//! # Architecture Principles
//!
//! 1. **Pull, then push** - Derived views recompute lazily on read; only
//!    effects are scheduled eagerly, and they run after the batch settles
//! 2. **Pure views** - Derived computations never write atoms or fetch
//! 3. **Explicit untracked reads** - `get_untracked` / `Runtime::untrack`
//!    instead of hidden side channels
//! 4. **Ownership is lifetime** - Dropping an `Effect` or `TaskHandle`
//!    tears it down

pub mod atom;
pub mod derived;
pub mod effect;
pub mod relay;
pub mod runtime;
pub mod task;

pub use atom::{Atom, ReadOnly};
pub use derived::Derived;
pub use effect::Effect;
pub use relay::{Relay, RelayError, relay};
pub use runtime::Runtime;
pub use task::{AutoRefresh, Task, TaskHandle};
