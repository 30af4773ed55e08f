//! The safe-HTML seam.
//!
//! The concrete safe-HTML template engine is an external collaborator (out of
//! scope, per the purpose section): this module defines the newtype contract
//! a real engine would produce, plus a minimal reference [`Template`]
//! implementation used by this crate's own tests so the dispatcher's Template
//! branch has something concrete to execute.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::DispatchError;

/// A string guaranteed, by construction, to be free of content an attacker
/// controls in a way that could execute as markup or script. There is no
/// public constructor that takes an arbitrary `String` — every way to obtain
/// one either escapes untrusted input or is explicitly marked as trusting the
/// caller with a constant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SafeHtml(String);

impl SafeHtml {
    /// Escapes `s` for safe inclusion in an HTML document body.
    pub fn html_escaped(s: &str) -> Self {
        let mut out = String::with_capacity(s.len());
        for ch in s.chars() {
            match ch {
                '&' => out.push_str("&amp;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                '"' => out.push_str("&#34;"),
                '\'' => out.push_str("&#39;"),
                _ => out.push(ch),
            }
        }
        SafeHtml(out)
    }

    /// Constructs a `SafeHtml` from a value the caller asserts is already
    /// safe (e.g. a compile-time constant, or the output of a vetted
    /// templating engine). Never call this with untrusted input.
    pub fn trusted(s: impl Into<String>) -> Self {
        SafeHtml(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0.into_bytes()
    }
}

impl fmt::Display for SafeHtml {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A zero-argument function bound into a template's function map, producing
/// a string that the template engine is trusted to place into an
/// attribute/text position without further escaping (e.g. a CSRF token, a CSP
/// nonce).
pub type TemplateFunc = std::sync::Arc<dyn Fn() -> String + Send + Sync>;

/// A map from a template's declared placeholder function names to their
/// implementations. Passed alongside the response data; the dispatcher
/// rejects a Template response whose function map does not exactly match the
/// template's declared functions.
#[derive(Clone, Default)]
pub struct FuncMap(BTreeMap<String, TemplateFunc>);

impl FuncMap {
    pub fn new() -> Self {
        FuncMap(BTreeMap::new())
    }

    pub fn insert(mut self, name: impl Into<String>, f: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.0.insert(name.into(), std::sync::Arc::new(f));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&TemplateFunc> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// The seam a safe-HTML template engine implements. A real implementation
/// sits outside this crate (a compiled, auto-escaping template set); this
/// trait is what the dispatcher depends on.
pub trait Template: Send + Sync {
    /// The function names this template declares as placeholders (e.g.
    /// `Token`, `Nonce`). The dispatcher checks this against the supplied
    /// [`FuncMap`] before executing.
    fn declared_funcs(&self) -> &[&str];

    /// Executes the template against `data` (rendered with `{{.}}`) and the
    /// resolved function map, returning the rendered, already-safe output.
    fn execute(&self, data: &str, funcs: &FuncMap) -> Result<SafeHtml, DispatchError>;
}

/// A minimal reference [`Template`] implementation: a literal string
/// containing `{{.}}` for the data value and `{{Name}}` placeholders for
/// declared functions. Not the engine prescribed for production use (that is
/// the external collaborator this module defers to) — exists so the
/// dispatcher's Template branch has something concrete to exercise in tests.
pub struct LiteralTemplate {
    source: &'static str,
    funcs: Vec<&'static str>,
}

impl LiteralTemplate {
    pub fn new(source: &'static str, funcs: Vec<&'static str>) -> Self {
        LiteralTemplate { source, funcs }
    }
}

impl Template for LiteralTemplate {
    fn declared_funcs(&self) -> &[&str] {
        &self.funcs
    }

    fn execute(&self, data: &str, funcs: &FuncMap) -> Result<SafeHtml, DispatchError> {
        let mut out = self.source.replace("{{.}}", data);
        for name in &self.funcs {
            let f = funcs
                .get(name)
                .ok_or_else(|| DispatchError::new(format!("template function {name:?} not bound")))?;
            out = out.replace(&format!("{{{{{name}}}}}"), &f());
        }
        Ok(SafeHtml::trusted(out))
    }
}
