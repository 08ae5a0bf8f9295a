//! The patcher seam.
//!
//! The runtime never touches a real document; it hands finished view-node
//! trees to a `Patcher` and reports removals. `TestPatcher` records both
//! so tests can assert on commit order and content.

use std::cell::RefCell;

use fern_vdom::VNode;

pub type ComponentId = u64;

/// Where a root component mounts. A detached target defers the `mounted`
/// lifecycle walk until the tree is attached.
#[derive(Debug, Clone, Copy)]
pub struct MountTarget {
    pub attached: bool,
}

impl MountTarget {
    pub fn attached() -> Self {
        MountTarget { attached: true }
    }

    pub fn detached() -> Self {
        MountTarget { attached: false }
    }
}

pub trait Patcher {
    /// A component's full view tree is ready to apply.
    fn commit(&self, component: ComponentId, node: &VNode);

    /// A component left the tree for good.
    fn remove(&self, component: ComponentId);
}

/// Records commits (as flattened text) and removals.
#[derive(Default)]
pub struct TestPatcher {
    pub commits: RefCell<Vec<(ComponentId, String)>>,
    pub removed: RefCell<Vec<ComponentId>>,
}

impl TestPatcher {
    pub fn new() -> Self {
        TestPatcher::default()
    }

    pub fn texts(&self) -> Vec<String> {
        self.commits
            .borrow()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }
}

impl Patcher for TestPatcher {
    fn commit(&self, component: ComponentId, node: &VNode) {
        self.commits
            .borrow_mut()
            .push((component, node.text_content()));
    }

    fn remove(&self, component: ComponentId) {
        self.removed.borrow_mut().push(component);
    }
}
