//! Directive-based template compiler and component runtime.
//!
//! Templates are plain XML-ish markup carrying directive attributes
//! (`if`, `foreach`, `call`, `widget`, ...). The compiler lowers each
//! template to a flat step program once and caches it; rendering
//! evaluates the program against a JSON context value and produces a
//! virtual node tree. The runtime layers stateful widgets on top,
//! reconciling child components between renders and driving their
//! lifecycle hooks.
//!
//! ```
//! use fern::{json, RenderExtra, TemplateCompiler};
//!
//! let mut compiler = TemplateCompiler::new();
//! compiler
//!     .add_template("hello", r#"<p>Hello {{ name }}!</p>"#)
//!     .unwrap();
//!
//! let mut extra = RenderExtra::new();
//! let node = compiler
//!     .render("hello", &json!({ "name": "fern" }), &mut extra)
//!     .unwrap();
//! assert_eq!(node.text_content(), "Hello fern!");
//! ```

pub use fern_template::{
    parse_document, Attr, Element, Node, Template, TemplateError, TemplateErrorCode,
    TemplateRegistry, TemplateResult, TextNode,
};

pub use fern_vdom::{
    escape_html, json, KeyValue, Map, Value, VElement, VNode,
};

pub use fern_compiler::{
    evaluate, CompileError, CompileErrorCode, CompileResult, CompilerOptions, RenderError,
    RenderErrorCode, RenderExtra, RenderResult, SlotKey, TemplateCompiler, WidgetRequest,
};

pub use fern_runtime::{
    ComponentId, ComponentTree, Env, LocalFuture, MountTarget, Patcher, RuntimeError,
    RuntimeResult, TestPatcher, Widget,
};
