//! Component runtime: widget instances over compiled templates.
//!
//! A `ComponentTree` owns a template compiler, a widget environment, and
//! an arena of component instances. It renders components through the
//! compiler, reconciles child widgets by slot identity, and drives the
//! lifecycle: `will_start` before the first render, `mounted` top-down on
//! attach, `will_unmount` on detach, `destroyed` deepest-first. Finished
//! view trees go to a `Patcher`; the runtime itself never touches a
//! document.

pub mod error;
pub mod patch;
pub mod tree;
pub mod widget;

pub use error::{RuntimeError, RuntimeResult};
pub use patch::{ComponentId, MountTarget, Patcher, TestPatcher};
pub use tree::ComponentTree;
pub use widget::{Env, LocalFuture, Widget};
