//! The widget contract and the shared environment.

use std::future::Future;
use std::pin::Pin;

use fern_vdom::{json, Value};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

/// Boxed single-threaded future, the shape every async hook returns.
pub type LocalFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// A component class. Instances own their props and state through the
/// component tree; the widget supplies behavior: which template renders
/// it, lifecycle reactions, and event handling.
///
/// Event handling is reducer-shaped: `on_event` sees the current state
/// and props and returns a state patch, which the tree applies and
/// re-renders on.
pub trait Widget {
    /// Name of the registered template that renders this widget.
    fn template(&self) -> &str;

    fn initial_state(&self, _props: &Value) -> Value {
        json!({})
    }

    /// Awaited once before the first render.
    fn will_start(&mut self) -> LocalFuture<'_, ()> {
        Box::pin(std::future::ready(()))
    }

    /// Fires top-down once the instance is attached to a live target.
    fn mounted(&mut self) {}

    /// Fires when the instance leaves the live tree, before destruction or
    /// keep-alive detachment.
    fn will_unmount(&mut self) {}

    fn destroyed(&mut self) {}

    /// Gate for prop updates; returning false skips the re-render.
    fn should_update(&mut self, _next_props: &Value) -> bool {
        true
    }

    fn on_event(
        &mut self,
        _handler: &str,
        _args: &[Value],
        _state: &Value,
        _props: &Value,
    ) -> Option<Value> {
        None
    }
}

type Factory = Box<dyn Fn(&Value) -> Box<dyn Widget>>;

/// The environment widgets are resolved against: a name-to-factory map
/// shared by every component in a tree.
#[derive(Default)]
pub struct Env {
    widgets: FxHashMap<SmolStr, Factory>,
}

impl Env {
    pub fn new() -> Self {
        Env::default()
    }

    pub fn register_widget(
        &mut self,
        name: impl Into<SmolStr>,
        factory: impl Fn(&Value) -> Box<dyn Widget> + 'static,
    ) {
        self.widgets.insert(name.into(), Box::new(factory));
    }

    pub fn create(&self, name: &str, props: &Value) -> Option<Box<dyn Widget>> {
        self.widgets.get(name).map(|factory| factory(props))
    }

    pub fn has_widget(&self, name: &str) -> bool {
        self.widgets.contains_key(name)
    }
}
