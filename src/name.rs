use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;

/// A cheap-to-clone interned-ish identifier for variables, functions, and
/// buffers. Unlike the hierarchical dotted names of a proof assistant, the
/// IR here only ever needs flat symbols, so `Symbol` is a thin `Arc<str>`
/// wrapper: cloning is a refcount bump, and equality/hash are by content.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(Arc<str>);

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Symbol {
        Symbol::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Symbol {
        Symbol(Arc::from(s))
    }
}

impl std::fmt::Debug for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::borrow::Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Process-wide counter backing `unique_name`. Lowering introduces fresh
/// loop and split variables (`x.outer`, `x.inner`, ...) on every pass that
/// rewrites a `For`; a monotonically increasing suffix is enough to avoid
/// collisions without threading a name supply through every pass.
static UNIQUE_SUFFIX: AtomicU64 = AtomicU64::new(0);

/// Returns `{prefix}${n}` for a fresh `n`, process-wide. Used by passes
/// that need a variable name guaranteed not to collide with anything the
/// user wrote, such as split outer/inner vars and sliding-window temporaries.
pub fn unique_name(prefix: &str) -> Symbol {
    let n = UNIQUE_SUFFIX.fetch_add(1, Relaxed);
    Symbol::new(format!("{}${}", prefix, n))
}

/// Resets the unique-name counter. Called once at the start of a
/// compilation so that names are reproducible across runs (see
/// `Compilation::clear` in `lower.rs`) -- tests that compare lowered IR to
/// a literal expected string depend on this.
pub fn reset_unique_names() {
    UNIQUE_SUFFIX.store(0, Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_names_dont_collide() {
        reset_unique_names();
        let a = unique_name("x");
        let b = unique_name("x");
        assert_ne!(a, b);
    }

    #[test]
    fn symbol_eq_is_structural() {
        let a = Symbol::new("foo");
        let b = Symbol::from("foo".to_string());
        assert_eq!(a, b);
    }
}
