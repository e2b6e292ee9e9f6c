//! Observe plain data, track which computations read which fields, and re-run exactly those
//! computations when the fields change.
//!
//! Data lives in [Object]s and [List]s of dynamically-typed [Value]s. [observe] turns every
//! field of a container (recursively) into a reactive slot. A [Watcher] evaluates a getter
//! while registered as the *active target* of a [Reactor]: every reactive field it reads
//! through the reactor subscribes it to that field's [Dep]. Writing a field notifies its
//! subscribers, which either re-run immediately (`sync`), mark themselves dirty (`lazy`,
//! used by [Computed]), or are queued and run in a batch by [Reactor::flush].
//!
//! Because values are shared and mutated through `Rc` handles, every tracked operation takes
//! the reactor as context (`x.get(&rx, "key")`), the same way you'd pass a graph around.
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use mini_observe::{observe, Expr, Object, Reactor, Value, Watcher, WatchOptions};
//!
//! let rx = Reactor::new();
//! let state: Object = [("count", 1)].into_iter().collect();
//! observe(&rx, &Value::Object(state.clone()), false);
//!
//! let runs = Rc::new(Cell::new(0));
//! let (state2, runs2) = (state.clone(), runs.clone());
//! let watcher = Watcher::new(&rx, None, Expr::getter(move |rx| {
//!     runs2.set(runs2.get() + 1);
//!     Ok(state2.get(rx, "count"))
//! }), None, WatchOptions::default())?;
//!
//! state.set(&rx, "count", Value::from(2));
//! rx.flush()?;
//! assert_eq!(runs.get(), 2);
//! assert_eq!(watcher.value(), Value::from(2));
//! # Ok::<(), mini_observe::Error>(())
//! ```
//!
//! Component-like structure is provided by [Instance]: an owner tree with props, data,
//! computed properties, watches and provide/inject, all built on the primitives above.

pub(crate) mod uid;
pub(crate) mod config;
pub(crate) mod error;
pub(crate) mod reactor;
pub(crate) mod dep;
pub(crate) mod value;
pub(crate) mod observer;
pub(crate) mod watcher;
pub(crate) mod scheduler;
pub(crate) mod computed;
pub(crate) mod instance;
pub(crate) mod inject;

pub use uid::*;
pub use config::*;
pub use error::*;
pub use reactor::*;
pub use dep::*;
pub use value::*;
pub use observer::*;
pub use watcher::*;
pub use computed::*;
pub use instance::*;
pub use inject::*;
