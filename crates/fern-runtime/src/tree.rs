//! The component tree: instance arena, lifecycle scheduling, and child
//! reconciliation.
//!
//! Instances live in an id-keyed arena; each holds its widget, props,
//! state, and a child map keyed by slot identity. Rendering is async so
//! newly created children can await their `will_start` hook; every update
//! bumps the instance's render generation, and a render that finds the
//! generation moved on while it was suspended commits nothing.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use fern_compiler::{RenderExtra, SlotKey, TemplateCompiler, WidgetRequest};
use fern_vdom::{BoundHandler, Hook, Map, Value, VNode};
use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;

use crate::error::{RuntimeError, RuntimeResult};
use crate::patch::{ComponentId, MountTarget, Patcher};
use crate::widget::{Env, LocalFuture, Widget};

struct Instance {
    parent: Option<ComponentId>,
    widget: Box<dyn Widget>,
    template: SmolStr,
    props: Value,
    state: Value,
    refs: FxHashMap<String, SmolStr>,
    cmap: FxHashMap<SlotKey, ComponentId>,
    children: Vec<ComponentId>,
    handlers: Rc<RefCell<FxHashMap<u32, Rc<BoundHandler>>>>,
    generation: u64,
    rendered: Option<VNode>,
    keep_alive: bool,
    mounted: bool,
    detached: bool,
    destroyed: bool,
}

/// Stand-in while a widget is temporarily moved out to await a hook.
struct NullWidget;

impl Widget for NullWidget {
    fn template(&self) -> &str {
        ""
    }
}

pub struct ComponentTree {
    compiler: TemplateCompiler,
    env: Env,
    patcher: Rc<dyn Patcher>,
    instances: RefCell<FxHashMap<ComponentId, Rc<RefCell<Instance>>>>,
    next_id: Cell<ComponentId>,
    root: Cell<Option<ComponentId>>,
}

impl ComponentTree {
    pub fn new(compiler: TemplateCompiler, env: Env, patcher: Rc<dyn Patcher>) -> Self {
        ComponentTree {
            compiler,
            env,
            patcher,
            instances: RefCell::new(FxHashMap::default()),
            next_id: Cell::new(1),
            root: Cell::new(None),
        }
    }

    pub fn compiler(&self) -> &TemplateCompiler {
        &self.compiler
    }

    pub fn root(&self) -> Option<ComponentId> {
        self.root.get()
    }

    pub fn is_live(&self, id: ComponentId) -> bool {
        self.instances.borrow().contains_key(&id)
    }

    /// The component's last produced view tree.
    pub fn committed(&self, id: ComponentId) -> Option<VNode> {
        self.instances
            .borrow()
            .get(&id)
            .and_then(|cell| cell.borrow().rendered.clone())
    }

    pub fn state(&self, id: ComponentId) -> Option<Value> {
        self.instances
            .borrow()
            .get(&id)
            .map(|cell| cell.borrow().state.clone())
    }

    /// Names captured by `ref` directives in the last render, mapped to
    /// the captured element's tag.
    pub fn refs(&self, id: ComponentId) -> Option<FxHashMap<String, SmolStr>> {
        self.instances
            .borrow()
            .get(&id)
            .map(|cell| cell.borrow().refs.clone())
    }

    pub fn child_ids(&self, id: ComponentId) -> Vec<ComponentId> {
        self.instances
            .borrow()
            .get(&id)
            .map(|cell| cell.borrow().children.clone())
            .unwrap_or_default()
    }

    fn instance(&self, id: ComponentId) -> RuntimeResult<Rc<RefCell<Instance>>> {
        self.instances
            .borrow()
            .get(&id)
            .cloned()
            .ok_or(RuntimeError::MissingComponent(id))
    }

    /// Instantiates a widget as the tree root, renders it, and commits the
    /// result. The `mounted` walk fires only against an attached target;
    /// `attach` runs it later otherwise.
    pub async fn mount(
        &self,
        name: &str,
        props: Value,
        target: MountTarget,
    ) -> RuntimeResult<ComponentId> {
        let id = self.create_instance(name, props, None, false).await?;
        self.root.set(Some(id));
        self.render_and_commit(id).await?;
        if target.attached {
            self.fire_mounted(id)?;
        }
        Ok(id)
    }

    /// Runs the deferred `mounted` walk for a tree mounted on a detached
    /// target.
    pub fn attach(&self) -> RuntimeResult<()> {
        if let Some(root) = self.root.get() {
            self.fire_mounted(root)?;
        }
        Ok(())
    }

    /// Merges a patch into the component's state and re-renders. An empty
    /// patch is a no-op.
    pub async fn update_state(&self, id: ComponentId, patch: Value) -> RuntimeResult<()> {
        let cell = self.instance(id)?;
        let changed = {
            let mut inst = cell.borrow_mut();
            match patch {
                Value::Object(map) if map.is_empty() => false,
                Value::Object(map) => {
                    if let Value::Object(state) = &mut inst.state {
                        for (key, value) in map {
                            state.insert(key, value);
                        }
                    } else {
                        inst.state = Value::Object(map);
                    }
                    inst.generation += 1;
                    true
                }
                _ => false,
            }
        };
        if !changed {
            return Ok(());
        }
        self.render_and_commit(id).await
    }

    /// Replaces the component's props, gated by `should_update`.
    pub async fn update_props(&self, id: ComponentId, props: Value) -> RuntimeResult<()> {
        let cell = self.instance(id)?;
        let accepted = {
            let mut inst = cell.borrow_mut();
            if inst.props == props {
                false
            } else if inst.widget.should_update(&props) {
                inst.props = props;
                inst.generation += 1;
                true
            } else {
                false
            }
        };
        if !accepted {
            return Ok(());
        }
        self.render_and_commit(id).await
    }

    /// Runs the handler bound to a compiled node id and applies the state
    /// patch it returns. Unknown node ids are ignored.
    pub async fn dispatch(&self, id: ComponentId, node: u32) -> RuntimeResult<()> {
        let cell = self.instance(id)?;
        let patch = {
            let mut inst = cell.borrow_mut();
            let handler = inst.handlers.borrow().get(&node).cloned();
            let Some(handler) = handler else {
                return Ok(());
            };
            let Instance {
                widget,
                state,
                props,
                ..
            } = &mut *inst;
            widget.on_event(&handler.handler, &handler.args, state, props)
        };
        match patch {
            Some(patch) => self.update_state(id, patch).await,
            None => Ok(()),
        }
    }

    /// Destroys a component and its subtree, deepest first. Idempotent.
    pub fn destroy(&self, id: ComponentId) {
        let Some(cell) = self.instances.borrow().get(&id).cloned() else {
            return;
        };
        let (children, was_mounted, parent) = {
            let inst = cell.borrow();
            if inst.destroyed {
                return;
            }
            (
                inst.cmap.values().copied().collect::<Vec<_>>(),
                inst.mounted,
                inst.parent,
            )
        };
        for child in children {
            self.destroy(child);
        }
        {
            let mut inst = cell.borrow_mut();
            if was_mounted {
                inst.widget.will_unmount();
                inst.mounted = false;
            }
            inst.widget.destroyed();
            inst.destroyed = true;
            inst.refs.clear();
            inst.rendered = None;
        }
        self.instances.borrow_mut().remove(&id);
        if let Some(parent_cell) = parent.and_then(|p| self.instances.borrow().get(&p).cloned()) {
            let mut inst = parent_cell.borrow_mut();
            inst.cmap.retain(|_, child| *child != id);
            inst.children.retain(|child| *child != id);
        }
        self.patcher.remove(id);
        if self.root.get() == Some(id) {
            self.root.set(None);
        }
    }

    async fn create_instance(
        &self,
        name: &str,
        props: Value,
        parent: Option<ComponentId>,
        keep_alive: bool,
    ) -> RuntimeResult<ComponentId> {
        let widget = self
            .env
            .create(name, &props)
            .ok_or_else(|| RuntimeError::UnknownWidget(name.to_string()))?;
        let state = widget.initial_state(&props);
        let template = SmolStr::new(widget.template());
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let instance = Instance {
            parent,
            widget,
            template,
            props,
            state,
            refs: FxHashMap::default(),
            cmap: FxHashMap::default(),
            children: Vec::new(),
            handlers: Rc::new(RefCell::new(FxHashMap::default())),
            generation: 0,
            rendered: None,
            keep_alive,
            mounted: false,
            detached: false,
            destroyed: false,
        };
        self.instances
            .borrow_mut()
            .insert(id, Rc::new(RefCell::new(instance)));
        self.run_will_start(id).await?;
        Ok(id)
    }

    /// Awaits the widget's `will_start` without holding the instance
    /// borrow across the suspension point.
    async fn run_will_start(&self, id: ComponentId) -> RuntimeResult<()> {
        let cell = self.instance(id)?;
        let mut widget = std::mem::replace(&mut cell.borrow_mut().widget, Box::new(NullWidget));
        widget.will_start().await;
        cell.borrow_mut().widget = widget;
        Ok(())
    }

    /// Renders a component and, unless the render went stale, commits the
    /// result through the patcher and re-runs the `mounted` walk for any
    /// children this render introduced.
    async fn render_and_commit(&self, id: ComponentId) -> RuntimeResult<()> {
        let Some(node) = self.render_component(id).await? else {
            return Ok(());
        };
        self.patcher.commit(id, &node);
        let mounted = self.instance(id)?.borrow().mounted;
        if mounted {
            self.fire_mounted(id)?;
        }
        Ok(())
    }

    fn render_component(&self, id: ComponentId) -> LocalFuture<'_, RuntimeResult<Option<VNode>>> {
        Box::pin(async move {
            let cell = self.instance(id)?;
            let (template, context, generation, handlers) = {
                let inst = cell.borrow();
                let mut map = Map::new();
                map.insert("props".to_string(), inst.props.clone());
                map.insert("state".to_string(), inst.state.clone());
                (
                    inst.template.clone(),
                    Value::Object(map),
                    inst.generation,
                    Rc::clone(&inst.handlers),
                )
            };
            let mut extra = RenderExtra::with_handlers(handlers);
            let mut node = self.compiler.render(&template, &context, &mut extra)?;
            let subtrees = self.resolve_children(id, extra.widgets, generation).await?;
            splice_slots(&mut node, &mut subtrees.into_iter());

            let cell = self.instance(id)?;
            let mut inst = cell.borrow_mut();
            if inst.generation != generation {
                // A newer update superseded this render while it was
                // suspended.
                return Ok(None);
            }
            inst.rendered = Some(node.clone());
            inst.refs.clear();
            collect_refs(&node, &mut inst.refs);
            Ok(Some(node))
        })
    }

    /// Matches this render's widget requests against the previous child
    /// map. A matched key reuses the instance; unmatched instances are
    /// destroyed, or detached when they were created keep-alive. The child
    /// map is only committed while `generation` is still current; a
    /// superseded pass destroys whatever it created and leaves the map to
    /// the render that replaced it.
    fn resolve_children(
        &self,
        parent: ComponentId,
        requests: Vec<WidgetRequest>,
        generation: u64,
    ) -> LocalFuture<'_, RuntimeResult<Vec<VNode>>> {
        Box::pin(async move {
            let parent_cell = self.instance(parent)?;
            let mut previous = parent_cell.borrow().cmap.clone();
            let mut next = FxHashMap::default();
            let mut ids = Vec::new();
            let mut created = Vec::new();
            let mut subtrees = Vec::new();
            for request in requests {
                let child_id = match previous.remove(&request.key) {
                    Some(existing) if self.is_live(existing) => {
                        self.revive_child(existing, &request).await?;
                        existing
                    }
                    _ => {
                        let fresh = self
                            .create_instance(
                                &request.name,
                                request.props.clone(),
                                Some(parent),
                                request.keep_alive,
                            )
                            .await?;
                        self.render_component(fresh).await?;
                        created.push(fresh);
                        fresh
                    }
                };
                let subtree = self
                    .instance(child_id)?
                    .borrow()
                    .rendered
                    .clone()
                    .unwrap_or_else(|| VNode::Text(String::new()));
                subtrees.push(decorate_child(subtree, child_id, request.keep_alive));
                next.insert(request.key.clone(), child_id);
                ids.push(child_id);
            }
            if parent_cell.borrow().generation != generation {
                // A newer update owns the child map now; instances this
                // pass created and nothing else references are dropped.
                let claimed: FxHashSet<ComponentId> =
                    parent_cell.borrow().cmap.values().copied().collect();
                for id in created {
                    if !claimed.contains(&id) {
                        self.destroy(id);
                    }
                }
                return Ok(subtrees);
            }
            for (key, stale) in previous {
                let keep = self
                    .instances
                    .borrow()
                    .get(&stale)
                    .map(|cell| cell.borrow().keep_alive)
                    .unwrap_or(false);
                if keep {
                    self.detach_component(stale)?;
                    next.insert(key, stale);
                } else {
                    self.destroy(stale);
                }
            }
            let mut inst = parent_cell.borrow_mut();
            inst.cmap = next;
            inst.children = ids;
            Ok(subtrees)
        })
    }

    /// Re-renders an existing child for a new request when needed: a
    /// detached keep-alive instance always re-renders, structurally equal
    /// props reuse the last render, and differing props go through
    /// `should_update`.
    async fn revive_child(&self, id: ComponentId, request: &WidgetRequest) -> RuntimeResult<()> {
        let cell = self.instance(id)?;
        let (props_equal, was_detached, has_render) = {
            let inst = cell.borrow();
            (
                inst.props == request.props,
                inst.detached,
                inst.rendered.is_some(),
            )
        };
        if was_detached {
            cell.borrow_mut().detached = false;
        }
        if props_equal && !was_detached && has_render {
            return Ok(());
        }
        if !props_equal {
            let accepted = {
                let mut inst = cell.borrow_mut();
                inst.widget.should_update(&request.props)
            };
            if !accepted {
                return Ok(());
            }
            let mut inst = cell.borrow_mut();
            inst.props = request.props.clone();
            inst.generation += 1;
        }
        self.render_component(id).await?;
        Ok(())
    }

    /// Keep-alive removal: `will_unmount` walks the mounted subtree
    /// top-down, state and instances stay for revival.
    fn detach_component(&self, id: ComponentId) -> RuntimeResult<()> {
        let cell = self.instance(id)?;
        let children = {
            let mut inst = cell.borrow_mut();
            if inst.mounted {
                inst.widget.will_unmount();
                inst.mounted = false;
            }
            inst.detached = true;
            inst.children.clone()
        };
        for child in children {
            let _ = self.detach_component(child);
        }
        Ok(())
    }

    /// Top-down `mounted` walk; already-mounted instances are skipped, so
    /// re-running it after an update only reaches new children.
    fn fire_mounted(&self, id: ComponentId) -> RuntimeResult<()> {
        let cell = self.instance(id)?;
        let children = {
            let mut inst = cell.borrow_mut();
            if !inst.mounted {
                inst.mounted = true;
                inst.detached = false;
                inst.widget.mounted();
            }
            inst.children.clone()
        };
        for child in children {
            self.fire_mounted(child)?;
        }
        Ok(())
    }
}

/// Tags a child's root element with its lifecycle hook so the patcher
/// knows where the component boundary sits.
fn decorate_child(subtree: VNode, component: ComponentId, keep_alive: bool) -> VNode {
    match subtree {
        VNode::Element(mut el) => {
            el.hooks.push(Hook::ChildLifecycle {
                component,
                keep_alive,
            });
            VNode::Element(el)
        }
        other => other,
    }
}

/// Replaces slot placeholders with resolved child trees, in document
/// order. Evaluation records widget requests in the same order, so the
/// sequences line up one to one.
fn splice_slots(node: &mut VNode, subtrees: &mut std::vec::IntoIter<VNode>) {
    if matches!(node, VNode::Slot(_)) {
        if let Some(resolved) = subtrees.next() {
            *node = resolved;
        }
        return;
    }
    if let VNode::Element(el) = node {
        for child in &mut el.children {
            splice_slots(child, subtrees);
        }
    }
}

fn collect_refs(node: &VNode, refs: &mut FxHashMap<String, SmolStr>) {
    node.walk(&mut |n| {
        if let VNode::Element(el) = n {
            for hook in &el.hooks {
                if let Hook::Ref(name) = hook {
                    refs.insert(name.clone(), el.tag.clone());
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::TestPatcher;
    use fern_vdom::json;
    use pretty_assertions::assert_eq;
    use tokio::sync::Notify;

    #[derive(Default, Clone)]
    struct Tally {
        created: Rc<Cell<u32>>,
        mounted: Rc<Cell<u32>>,
        unmounted: Rc<Cell<u32>>,
        destroyed: Rc<Cell<u32>>,
    }

    struct Counter {
        tally: Tally,
    }

    impl Widget for Counter {
        fn template(&self) -> &str {
            "counter"
        }

        fn initial_state(&self, _props: &Value) -> Value {
            json!({ "n": 0 })
        }

        fn mounted(&mut self) {
            self.tally.mounted.set(self.tally.mounted.get() + 1);
        }

        fn on_event(
            &mut self,
            handler: &str,
            args: &[Value],
            state: &Value,
            _props: &Value,
        ) -> Option<Value> {
            if handler != "bump" {
                return None;
            }
            let n = state["n"].as_f64().unwrap_or(0.0);
            let step = args.first().and_then(Value::as_f64).unwrap_or(1.0);
            Some(json!({ "n": n + step }))
        }
    }

    struct Label {
        tally: Tally,
    }

    impl Widget for Label {
        fn template(&self) -> &str {
            "label"
        }

        fn mounted(&mut self) {
            self.tally.mounted.set(self.tally.mounted.get() + 1);
        }

        fn will_unmount(&mut self) {
            self.tally.unmounted.set(self.tally.unmounted.get() + 1);
        }

        fn destroyed(&mut self) {
            self.tally.destroyed.set(self.tally.destroyed.get() + 1);
        }
    }

    struct List;

    impl Widget for List {
        fn template(&self) -> &str {
            "list"
        }
    }

    fn setup(templates: &[(&str, &str)], env: Env) -> (Rc<TestPatcher>, ComponentTree) {
        let mut compiler = TemplateCompiler::new();
        for (name, markup) in templates {
            compiler.add_template(name, markup).unwrap();
        }
        let patcher = Rc::new(TestPatcher::new());
        let tree = ComponentTree::new(compiler, env, patcher.clone());
        (patcher, tree)
    }

    fn counter_env(tally: &Tally) -> Env {
        let mut env = Env::new();
        let tally = tally.clone();
        env.register_widget("Counter", move |_| {
            tally.created.set(tally.created.get() + 1);
            Box::new(Counter {
                tally: tally.clone(),
            })
        });
        env
    }

    fn label_env(env: &mut Env, tally: &Tally) {
        let tally = tally.clone();
        env.register_widget("Label", move |_| {
            tally.created.set(tally.created.get() + 1);
            Box::new(Label {
                tally: tally.clone(),
            })
        });
    }

    const COUNTER: &str = r#"<div><button on-click="bump(1)">{{ state.n }}</button></div>"#;
    const LABEL: &str = r#"<span>{{ props.text }}</span>"#;

    #[tokio::test]
    async fn mount_commits_and_fires_mounted() {
        let tally = Tally::default();
        let (patcher, tree) = setup(&[("counter", COUNTER)], counter_env(&tally));
        let root = tree
            .mount("Counter", json!({}), MountTarget::attached())
            .await
            .unwrap();
        assert_eq!(patcher.texts(), vec!["0"]);
        assert_eq!(tally.mounted.get(), 1);
        assert!(tree.is_live(root));
    }

    #[tokio::test]
    async fn detached_mount_defers_mounted() {
        let tally = Tally::default();
        let (patcher, tree) = setup(&[("counter", COUNTER)], counter_env(&tally));
        tree.mount("Counter", json!({}), MountTarget::detached())
            .await
            .unwrap();
        assert_eq!(tally.mounted.get(), 0);
        assert_eq!(patcher.texts(), vec!["0"]);
        tree.attach().unwrap();
        assert_eq!(tally.mounted.get(), 1);
    }

    #[tokio::test]
    async fn dispatch_applies_state_patch_and_rerenders() {
        let tally = Tally::default();
        let (patcher, tree) = setup(&[("counter", COUNTER)], counter_env(&tally));
        let root = tree
            .mount("Counter", json!({}), MountTarget::attached())
            .await
            .unwrap();
        let node = tree.committed(root).unwrap();
        let button = node.as_element().unwrap().children[0].as_element().unwrap().clone();
        assert_eq!(button.handlers[0].handler, "bump");
        tree.dispatch(root, button.handlers[0].node).await.unwrap();
        assert_eq!(patcher.texts(), vec!["0", "1"]);
        assert_eq!(tree.state(root).unwrap()["n"], json!(1.0));
    }

    #[tokio::test]
    async fn empty_state_patch_is_a_no_op() {
        let tally = Tally::default();
        let (patcher, tree) = setup(&[("counter", COUNTER)], counter_env(&tally));
        let root = tree
            .mount("Counter", json!({}), MountTarget::attached())
            .await
            .unwrap();
        tree.update_state(root, json!({})).await.unwrap();
        assert_eq!(patcher.texts(), vec!["0"]);
    }

    #[tokio::test]
    async fn unknown_widget_fails_to_mount() {
        let (_, tree) = setup(&[("counter", COUNTER)], Env::new());
        let err = tree
            .mount("Ghost", json!({}), MountTarget::attached())
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::UnknownWidget(name) if name == "Ghost"));
    }

    const LIST: &str = r#"<div><template foreach="props.items" as="it"><template widget="Label" key="it" props="{ text: it }"/></template></div>"#;

    #[tokio::test]
    async fn keyed_children_are_reused_across_reorders() {
        let tally = Tally::default();
        let mut env = Env::new();
        env.register_widget("List", |_| Box::new(List));
        label_env(&mut env, &tally);
        let (patcher, tree) = setup(&[("list", LIST), ("label", LABEL)], env);
        let root = tree
            .mount(
                "List",
                json!({ "items": ["a", "b"] }),
                MountTarget::attached(),
            )
            .await
            .unwrap();
        assert_eq!(tally.created.get(), 2);
        assert_eq!(tally.mounted.get(), 2);
        assert_eq!(patcher.texts().last().unwrap(), "ab");
        let before = tree.child_ids(root);

        tree.update_props(root, json!({ "items": ["b", "a"] }))
            .await
            .unwrap();
        assert_eq!(tally.created.get(), 2);
        assert_eq!(patcher.texts().last().unwrap(), "ba");
        let after = tree.child_ids(root);
        assert_eq!(before[0], after[1]);
        assert_eq!(before[1], after[0]);
    }

    #[tokio::test]
    async fn unmatched_child_is_destroyed() {
        let tally = Tally::default();
        let mut env = Env::new();
        env.register_widget("List", |_| Box::new(List));
        label_env(&mut env, &tally);
        let (patcher, tree) = setup(&[("list", LIST), ("label", LABEL)], env);
        let root = tree
            .mount(
                "List",
                json!({ "items": ["a", "b"] }),
                MountTarget::attached(),
            )
            .await
            .unwrap();
        let children = tree.child_ids(root);
        tree.update_props(root, json!({ "items": ["a"] }))
            .await
            .unwrap();
        assert_eq!(tally.destroyed.get(), 1);
        assert_eq!(tally.unmounted.get(), 1);
        assert!(!tree.is_live(children[1]));
        assert_eq!(patcher.removed.borrow().as_slice(), &[children[1]]);
    }

    const KEEP: &str = r#"<div><template foreach="props.items" as="it"><template widget="Label" key="it" props="{ text: it }" keep-alive=""/></template></div>"#;

    struct KeepList;

    impl Widget for KeepList {
        fn template(&self) -> &str {
            "keep"
        }
    }

    #[tokio::test]
    async fn keep_alive_child_detaches_and_revives() {
        let tally = Tally::default();
        let mut env = Env::new();
        env.register_widget("List", |_| Box::new(KeepList));
        label_env(&mut env, &tally);
        let (patcher, tree) = setup(&[("keep", KEEP), ("label", LABEL)], env);
        let root = tree
            .mount(
                "List",
                json!({ "items": ["a", "b"] }),
                MountTarget::attached(),
            )
            .await
            .unwrap();
        tree.update_props(root, json!({ "items": ["a"] }))
            .await
            .unwrap();
        assert_eq!(tally.unmounted.get(), 1);
        assert_eq!(tally.destroyed.get(), 0);
        assert_eq!(patcher.texts().last().unwrap(), "a");

        tree.update_props(root, json!({ "items": ["a", "b"] }))
            .await
            .unwrap();
        // Revived, not re-created.
        assert_eq!(tally.created.get(), 2);
        assert_eq!(tally.mounted.get(), 3);
        assert_eq!(patcher.texts().last().unwrap(), "ab");
    }

    struct Stubborn;

    impl Widget for Stubborn {
        fn template(&self) -> &str {
            "label"
        }

        fn should_update(&mut self, _next_props: &Value) -> bool {
            false
        }
    }

    struct Holder;

    impl Widget for Holder {
        fn template(&self) -> &str {
            "holder"
        }

        fn initial_state(&self, _props: &Value) -> Value {
            json!({ "n": 0 })
        }
    }

    #[tokio::test]
    async fn should_update_false_keeps_old_render() {
        let mut env = Env::new();
        env.register_widget("Holder", |_| Box::new(Holder));
        env.register_widget("Stubborn", |_| Box::new(Stubborn));
        let (patcher, tree) = setup(
            &[
                (
                    "holder",
                    r#"<div><template widget="Stubborn" key="'s'" props="{ text: state.n }"/></div>"#,
                ),
                ("label", LABEL),
            ],
            env,
        );
        let root = tree
            .mount("Holder", json!({}), MountTarget::attached())
            .await
            .unwrap();
        assert_eq!(patcher.texts().last().unwrap(), "0");
        tree.update_state(root, json!({ "n": 1 })).await.unwrap();
        // The child rejected the new props, so its old output is spliced.
        assert_eq!(patcher.texts().last().unwrap(), "0");
    }

    struct Slow {
        gate: Rc<Notify>,
        tally: Tally,
    }

    impl Widget for Slow {
        fn template(&self) -> &str {
            "label"
        }

        fn will_start(&mut self) -> LocalFuture<'_, ()> {
            let gate = Rc::clone(&self.gate);
            Box::pin(async move { gate.notified().await })
        }

        fn destroyed(&mut self) {
            self.tally.destroyed.set(self.tally.destroyed.get() + 1);
        }
    }

    fn slow_env(gate: &Rc<Notify>, tally: &Tally) -> Env {
        let mut env = Env::new();
        env.register_widget("Gate", |_| Box::new(Gate));
        let gate = Rc::clone(gate);
        let tally = tally.clone();
        env.register_widget("Slow", move |_| {
            tally.created.set(tally.created.get() + 1);
            Box::new(Slow {
                gate: Rc::clone(&gate),
                tally: tally.clone(),
            })
        });
        env
    }

    struct Gate;

    impl Widget for Gate {
        fn template(&self) -> &str {
            "gate"
        }

        fn initial_state(&self, _props: &Value) -> Value {
            json!({ "n": 0 })
        }
    }

    #[tokio::test]
    async fn superseded_render_does_not_commit() {
        let gate = Rc::new(Notify::new());
        let tally = Tally::default();
        let (patcher, tree) = setup(
            &[
                (
                    "gate",
                    r#"<div>{{ state.n }}<template if="state.n > 0" widget="Slow" key="state.n" props="{ text: '' }"/></div>"#,
                ),
                ("label", LABEL),
            ],
            slow_env(&gate, &tally),
        );
        let root = tree
            .mount("Gate", json!({}), MountTarget::attached())
            .await
            .unwrap();
        assert_eq!(patcher.texts(), vec!["0"]);

        // Both updates suspend on a freshly created child's will_start; the
        // second bumps the generation past the first, so only it commits.
        let first = tree.update_state(root, json!({ "n": 1 }));
        let second = tree.update_state(root, json!({ "n": 2 }));
        let release = async {
            tokio::task::yield_now().await;
            gate.notify_one();
            tokio::task::yield_now().await;
            gate.notify_one();
        };
        let (r1, r2, ()) = tokio::join!(first, second, release);
        r1.unwrap();
        r2.unwrap();
        assert_eq!(patcher.texts(), vec!["0", "2"]);
    }

    #[tokio::test]
    async fn superseded_render_children_are_destroyed() {
        let gate = Rc::new(Notify::new());
        let tally = Tally::default();
        let (patcher, tree) = setup(
            &[
                (
                    "gate",
                    r#"<div>{{ state.n }}<template if="state.n > 0" widget="Slow" key="state.n" props="{ text: '' }"/></div>"#,
                ),
                ("label", LABEL),
            ],
            slow_env(&gate, &tally),
        );
        let root = tree
            .mount("Gate", json!({}), MountTarget::attached())
            .await
            .unwrap();

        let first = tree.update_state(root, json!({ "n": 1 }));
        let second = tree.update_state(root, json!({ "n": 2 }));
        let release = async {
            tokio::task::yield_now().await;
            gate.notify_one();
            tokio::task::yield_now().await;
            gate.notify_one();
        };
        let (r1, r2, ()) = tokio::join!(first, second, release);
        r1.unwrap();
        r2.unwrap();

        // The losing update created an instance that never made it into the
        // child map; it must be torn down, leaving only the winner's child.
        assert_eq!(tally.created.get(), 2);
        assert_eq!(tally.destroyed.get(), 1);
        let children = tree.child_ids(root);
        assert_eq!(children.len(), 1);
        assert!(tree.is_live(children[0]));
        assert_eq!(patcher.texts(), vec!["0", "2"]);
    }

    #[tokio::test]
    async fn refs_are_recorded_and_destroy_unlinks() {
        let mut env = Env::new();
        env.register_widget("Holder", |_| Box::new(Holder));
        let (patcher, tree) = setup(
            &[("holder", r#"<div><input ref="field"/></div>"#)],
            env,
        );
        let root = tree
            .mount("Holder", json!({}), MountTarget::attached())
            .await
            .unwrap();
        let refs = tree.refs(root).unwrap();
        assert_eq!(refs.get("field").map(SmolStr::as_str), Some("input"));

        tree.destroy(root);
        tree.destroy(root);
        assert!(!tree.is_live(root));
        assert_eq!(tree.root(), None);
        assert_eq!(patcher.removed.borrow().len(), 1);
    }
}
