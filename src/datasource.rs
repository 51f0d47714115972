//! Table-scoped datasource routing for multi-database deployments.
//!
//! Instead of an ambient thread-local, every repository operation owns an
//! explicit [`DsContext`]: a small name stack supporting nested overrides.
//! [`DsContext::enter`] returns a guard that pops on drop, so push/pop always
//! balance even when the wrapped operation errors.

use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Mutex;

/// Per-operation datasource name stack. The mutex is held only for push, pop
/// and peek, never across an await point.
#[derive(Debug, Default)]
pub struct DsContext {
    stack: Mutex<Vec<String>>,
}

impl DsContext {
    pub fn new() -> Self {
        DsContext::default()
    }

    /// Push a datasource name, returning the pushed value (empty string stands
    /// in for the default datasource).
    pub fn push(&self, name: Option<&str>) -> String {
        let name = name.unwrap_or("").to_string();
        self.stack.lock().expect("ds stack poisoned").push(name.clone());
        name
    }

    pub fn pop(&self) {
        self.stack.lock().expect("ds stack poisoned").pop();
    }

    /// Current stack top; None when the stack is empty or the top is the
    /// default marker.
    pub fn current(&self) -> Option<String> {
        self.stack
            .lock()
            .expect("ds stack poisoned")
            .last()
            .filter(|s| !s.is_empty())
            .cloned()
    }

    pub fn depth(&self) -> usize {
        self.stack.lock().expect("ds stack poisoned").len()
    }

    /// Scoped acquisition: pushes when `name` is Some and pops when the guard
    /// drops. A None name is a no-op scope, matching tables without a binding.
    pub fn enter<'a>(&'a self, name: Option<&str>) -> DsScope<'a> {
        let pushed = name.is_some();
        if pushed {
            self.push(name);
        }
        DsScope { ctx: self, pushed }
    }
}

/// Drop guard for one datasource override.
pub struct DsScope<'a> {
    ctx: &'a DsContext,
    pushed: bool,
}

impl Drop for DsScope<'_> {
    fn drop(&mut self) {
        if self.pushed {
            self.ctx.pop();
        }
    }
}

/// Resolves, per table, which connection pool a storage call uses. Pools and
/// bindings are built once at boot and never mutated afterwards, so concurrent
/// reads need no synchronization.
#[derive(Clone, Debug)]
pub struct DatasourceRouter {
    default_name: String,
    pools: HashMap<String, PgPool>,
    bindings: HashMap<String, String>,
}

impl DatasourceRouter {
    pub fn new(
        default_name: impl Into<String>,
        pools: HashMap<String, PgPool>,
        bindings: HashMap<String, String>,
    ) -> Self {
        DatasourceRouter {
            default_name: default_name.into(),
            pools,
            bindings,
        }
    }

    pub fn single(pool: PgPool) -> Self {
        let mut pools = HashMap::new();
        pools.insert("default".to_string(), pool);
        DatasourceRouter::new("default", pools, HashMap::new())
    }

    pub fn default_name(&self) -> &str {
        &self.default_name
    }

    pub fn default_pool(&self) -> &PgPool {
        self.pools
            .get(&self.default_name)
            .expect("default datasource pool missing")
    }

    pub fn pools(&self) -> impl Iterator<Item = (&str, &PgPool)> {
        self.pools.iter().map(|(n, p)| (n.as_str(), p))
    }

    /// The datasource a table is bound to, when it differs from the default.
    pub fn binding(&self, table: &str) -> Option<&str> {
        self.bindings
            .get(table)
            .map(String::as_str)
            .filter(|name| *name != self.default_name)
    }

    /// Pool for the context's current override, falling back to the default
    /// pool when the stack is empty or names an unknown datasource.
    pub fn pool(&self, ctx: &DsContext) -> &PgPool {
        ctx.current()
            .and_then(|name| self.pools.get(&name))
            .unwrap_or_else(|| {
                self.pools
                    .get(&self.default_name)
                    .expect("default datasource pool missing")
            })
    }
}
