use std::cell::{Cell, RefCell};
use std::rc::Rc;

use fern_template::Element;
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

use crate::error::{CompileError, CompileResult};
use crate::program::Line;

/// A compile-time variable binding. Bindings hold either a raw expression
/// to substitute, or captured markup replayed on projection.
#[derive(Debug, Clone)]
pub enum Binding {
    Expr(String),
    Nodes(Vec<fern_template::Node>),
}

/// Mutable state shared by every context derived during one compile pass:
/// the emitted instruction stream, the id counter, the root slot, and the
/// program flags.
pub struct CompileSession {
    template: SmolStr,
    next_id: Cell<u32>,
    lines: RefCell<Vec<Line>>,
    root: Cell<Option<u32>>,
    protect_scope: Cell<bool>,
    needs_owner: Cell<bool>,
}

impl CompileSession {
    pub fn new(template: impl Into<SmolStr>) -> Rc<Self> {
        Rc::new(CompileSession {
            template: template.into(),
            next_id: Cell::new(0),
            lines: RefCell::new(Vec::new()),
            root: Cell::new(None),
            protect_scope: Cell::new(false),
            needs_owner: Cell::new(false),
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn generate_id(&self) -> u32 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    pub fn push(&self, line: Line) {
        self.lines.borrow_mut().push(line);
    }

    /// Binds the template's single root node. The second attempt in a pass
    /// fails.
    pub fn fix_root(&self, var: u32) -> CompileResult<()> {
        if self.root.get().is_some() {
            return Err(CompileError::more_than_one_root(&self.template));
        }
        self.root.set(Some(var));
        Ok(())
    }

    pub fn root(&self) -> Option<u32> {
        self.root.get()
    }

    pub fn mark_protect_scope(&self) {
        self.protect_scope.set(true);
    }

    pub fn protect_scope(&self) -> bool {
        self.protect_scope.get()
    }

    pub fn mark_needs_owner(&self) {
        self.needs_owner.set(true);
    }

    pub fn needs_owner(&self) -> bool {
        self.needs_owner.get()
    }

    pub fn take_lines(&self) -> Vec<Line> {
        std::mem::take(&mut self.lines.borrow_mut())
    }
}

struct Frame {
    parent_var: Option<u32>,
    variables: RefCell<FxHashMap<SmolStr, Binding>>,
    in_loop: bool,
    escaping: bool,
    caller: Option<Rc<Element>>,
    up: Option<Rc<Frame>>,
}

/// An immutable view over the compile session plus a chain of frames that
/// scope the current parent node, variable bindings, loop nesting, caller
/// markup, and escaping mode. Deriving a context is cheap; frames share
/// the session.
#[derive(Clone)]
pub struct CompilationContext {
    session: Rc<CompileSession>,
    frame: Rc<Frame>,
}

impl CompilationContext {
    pub fn new(session: Rc<CompileSession>) -> Self {
        CompilationContext {
            session,
            frame: Rc::new(Frame {
                parent_var: None,
                variables: RefCell::new(FxHashMap::default()),
                in_loop: false,
                escaping: false,
                caller: None,
                up: None,
            }),
        }
    }

    pub fn session(&self) -> &Rc<CompileSession> {
        &self.session
    }

    pub fn parent_var(&self) -> Option<u32> {
        self.frame.parent_var
    }

    pub fn in_loop(&self) -> bool {
        self.frame.in_loop
    }

    pub fn escaping(&self) -> bool {
        self.frame.escaping
    }

    pub fn caller(&self) -> Option<Rc<Element>> {
        self.frame.caller.clone()
    }

    pub fn generate_id(&self) -> u32 {
        self.session.generate_id()
    }

    pub fn add_line(&self, line: Line) {
        self.session.push(line);
    }

    /// Emits the placement instruction for a finished element: appended
    /// into the current parent, or bound as the program root at top level.
    /// The root slot was already fixed by `with_parent`.
    pub fn place(&self, var: u32) {
        match self.frame.parent_var {
            Some(parent) => self.add_line(Line::Append { parent, child: var }),
            None => self.add_line(Line::Root { var }),
        }
    }

    /// Places a node that never derives a child context (text, expression
    /// text, widget slots). At top level this also fixes the root slot.
    pub fn place_leaf(&self, var: u32) -> CompileResult<()> {
        match self.frame.parent_var {
            Some(parent) => self.add_line(Line::Append { parent, child: var }),
            None => {
                self.session.fix_root(var)?;
                self.add_line(Line::Root { var });
            }
        }
        Ok(())
    }

    fn derive(&self, f: impl FnOnce(&Frame) -> Frame) -> Self {
        CompilationContext {
            session: Rc::clone(&self.session),
            frame: Rc::new(f(&self.frame)),
        }
    }

    /// Derives a context whose emitted nodes append into `var`. The first
    /// call in a compile pass also fixes the template's root node; fixing
    /// it twice is an error.
    pub fn with_parent(&self, var: u32) -> CompileResult<Self> {
        if self.frame.parent_var.is_none() {
            self.session.fix_root(var)?;
        }
        Ok(self.derive(|frame| Frame {
            parent_var: Some(var),
            variables: RefCell::new(FxHashMap::default()),
            in_loop: frame.in_loop,
            escaping: frame.escaping,
            caller: frame.caller.clone(),
            up: Some(Rc::clone(&self.frame)),
        }))
    }

    pub fn with_variables(&self, variables: FxHashMap<SmolStr, Binding>) -> Self {
        self.derive(|frame| Frame {
            parent_var: frame.parent_var,
            variables: RefCell::new(variables),
            in_loop: frame.in_loop,
            escaping: frame.escaping,
            caller: frame.caller.clone(),
            up: Some(Rc::clone(&self.frame)),
        })
    }

    pub fn with_in_loop(&self) -> Self {
        self.derive(|frame| Frame {
            parent_var: frame.parent_var,
            variables: RefCell::new(FxHashMap::default()),
            in_loop: true,
            escaping: frame.escaping,
            caller: frame.caller.clone(),
            up: Some(Rc::clone(&self.frame)),
        })
    }

    pub fn with_caller(&self, caller: Option<Rc<Element>>) -> Self {
        self.derive(|frame| Frame {
            parent_var: frame.parent_var,
            variables: RefCell::new(FxHashMap::default()),
            in_loop: frame.in_loop,
            escaping: frame.escaping,
            caller,
            up: Some(Rc::clone(&self.frame)),
        })
    }

    pub fn with_escaping(&self) -> Self {
        self.derive(|frame| Frame {
            parent_var: frame.parent_var,
            variables: RefCell::new(FxHashMap::default()),
            in_loop: frame.in_loop,
            escaping: true,
            caller: frame.caller.clone(),
            up: Some(Rc::clone(&self.frame)),
        })
    }

    /// Binds a variable in the current frame, visible to the rest of this
    /// sibling list and to nested contexts derived from it.
    pub fn bind(&self, name: impl Into<SmolStr>, binding: Binding) {
        self.frame.variables.borrow_mut().insert(name.into(), binding);
    }

    /// Walks the frame chain for a binding.
    pub fn get_value(&self, name: &str) -> Option<Binding> {
        let mut frame = Some(&self.frame);
        while let Some(current) = frame {
            if let Some(binding) = current.variables.borrow().get(name) {
                return Some(binding.clone());
            }
            frame = current.up.as_ref();
        }
        None
    }

    /// Compile-time bindings captured in one flat map, innermost frames
    /// winning. Used to harvest declarations from a pre-compiled subtree.
    pub fn flatten_variables(&self) -> FxHashMap<SmolStr, Binding> {
        let mut out = FxHashMap::default();
        let mut frames = Vec::new();
        let mut frame = Some(&self.frame);
        while let Some(current) = frame {
            frames.push(current);
            frame = current.up.as_ref();
        }
        for current in frames.into_iter().rev() {
            for (name, binding) in current.variables.borrow().iter() {
                out.insert(name.clone(), binding.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sequential_per_session() {
        let session = CompileSession::new("t");
        assert_eq!(session.generate_id(), 0);
        assert_eq!(session.generate_id(), 1);
        assert_eq!(session.generate_id(), 2);
    }

    #[test]
    fn first_parent_fixes_root_and_second_top_level_fails() {
        let session = CompileSession::new("t");
        let ctx = CompilationContext::new(Rc::clone(&session));
        let child = ctx.with_parent(0).unwrap();
        assert_eq!(session.root(), Some(0));
        // Nested parents do not re-fix the root.
        child.with_parent(1).unwrap();
        let err = ctx.with_parent(2).err().unwrap();
        assert_eq!(err.code, crate::error::CompileErrorCode::MoreThanOneRoot);
    }

    #[test]
    fn bindings_walk_the_frame_chain() {
        let session = CompileSession::new("t");
        let ctx = CompilationContext::new(session);
        ctx.bind("greeting", Binding::Expr("'hi'".to_string()));
        let nested = ctx.with_parent(0).unwrap();
        assert!(matches!(
            nested.get_value("greeting"),
            Some(Binding::Expr(ref s)) if s == "'hi'"
        ));
        nested.bind("greeting", Binding::Expr("'hello'".to_string()));
        assert!(matches!(
            nested.get_value("greeting"),
            Some(Binding::Expr(ref s)) if s == "'hello'"
        ));
        // The outer frame keeps its own binding.
        assert!(matches!(
            ctx.get_value("greeting"),
            Some(Binding::Expr(ref s)) if s == "'hi'"
        ));
    }

    #[test]
    fn loop_and_escaping_flags_inherit() {
        let session = CompileSession::new("t");
        let ctx = CompilationContext::new(session);
        let looped = ctx.with_in_loop();
        let nested = looped.with_parent(0).unwrap();
        assert!(nested.in_loop());
        assert!(!nested.escaping());
        assert!(nested.with_escaping().escaping());
    }
}
