//! Watcher Implementation
//!
//! A `Watcher` is the concrete subscriber: it evaluates a getter while
//! collecting the dependency nodes it reads, caches the result, and re-runs
//! when any of those nodes notify.
//!
//! # Modes
//!
//! - **deep**: after evaluating, visit every nested property of the result
//!   so in-place mutations deep inside it also trigger a run.
//! - **lazy**: notifications only mark the watcher dirty; the value is
//!   recomputed on demand ([`Watcher::evaluate_if_dirty`]). Used by
//!   [`Computed`](super::Computed).
//! - **sync**: notifications run the watcher immediately instead of queuing
//!   it on the flush scheduler. No coalescing.
//! - **user**: getter and callback errors are reported and swallowed; the
//!   previous cached value is kept.
//!
//! # Dependency Sets
//!
//! Two generations are kept. Reads during an evaluation fill the
//! in-progress set; a node is subscribed to only if the committed set does
//! not already hold it. When the evaluation ends, nodes that were not read
//! again are released and the sets are swapped, so the watcher is always
//! subscribed to exactly what its last evaluation read.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::context::ReactiveContext;
use super::owner::OwnerInner;
use super::traverse::traverse;
use super::{Dep, DepId, Subscriber, SubscriberId};
use crate::error::{report, warn, ReactiveError, Result};
use crate::schedule::schedule_flush;
use crate::value::Value;

/// A getter evaluated against the watcher's target.
pub type GetterFn = dyn Fn(&Value) -> Result<Value>;

/// Called with `(new_value, old_value)` after a run that changed something.
pub type CallbackFn = dyn Fn(&Value, &Value) -> Result<()>;

pub type Callback = Rc<CallbackFn>;

/// A hook without arguments (`before`, `after_flush`).
pub type Hook = Rc<dyn Fn()>;

/// What a watcher evaluates.
#[derive(Clone)]
pub enum Getter {
    Function(Rc<GetterFn>),
    /// A dotted property path resolved against the target.
    Path { expression: String, segments: Vec<String> },
}

impl Getter {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&Value) -> Result<Value> + 'static,
    {
        Getter::Function(Rc::new(f))
    }

    /// Parse a dotted path.
    ///
    /// Paths may only contain alphanumerics, `_`, `$` and `.`. Anything else
    /// produces a diagnostic and a getter that always yields `Undefined`.
    pub fn path(expression: &str) -> Self {
        match parse_path(expression) {
            Ok(segments) => Getter::Path {
                expression: expression.to_owned(),
                segments,
            },
            Err(err) => {
                warn(&err);
                Getter::function(|_| Ok(Value::Undefined))
            }
        }
    }

    fn call(&self, target: &Value) -> Result<Value> {
        match self {
            Getter::Function(f) => f(target),
            Getter::Path { segments, .. } => Ok(resolve_path(target, segments)),
        }
    }

    fn expression(&self) -> Option<&str> {
        match self {
            Getter::Path { expression, .. } => Some(expression),
            Getter::Function(_) => None,
        }
    }
}

impl From<&str> for Getter {
    fn from(expression: &str) -> Self {
        Getter::path(expression)
    }
}

impl From<String> for Getter {
    fn from(expression: String) -> Self {
        Getter::path(&expression)
    }
}

impl fmt::Debug for Getter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Getter::Function(_) => f.write_str("Getter::Function"),
            Getter::Path { expression, .. } => write!(f, "Getter::Path({expression:?})"),
        }
    }
}

/// Split a watch expression into its segments.
pub fn parse_path(expression: &str) -> Result<Vec<String>> {
    let valid = expression
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '$' | '.'));
    if !valid {
        return Err(ReactiveError::InvalidPath(expression.to_owned()));
    }
    Ok(expression.split('.').map(str::to_owned).collect())
}

fn resolve_path(target: &Value, segments: &[String]) -> Value {
    let mut current = target.clone();
    for segment in segments {
        current = match &current {
            Value::Object(object) => object.get(segment),
            Value::Array(array) if segment == "length" => Value::from(array.len()),
            Value::Array(array) => segment
                .parse::<usize>()
                .map(|index| array.get(index))
                .unwrap_or_default(),
            Value::String(s) if segment == "length" => Value::from(s.encode_utf16().count()),
            _ => return Value::Undefined,
        };
    }
    current
}

/// Mode flags and hooks for a watcher.
#[derive(Clone, Default)]
pub struct WatcherOptions {
    pub deep: bool,
    pub user: bool,
    pub lazy: bool,
    pub sync: bool,
    /// Run the callback once right after creation. Honoured by
    /// [`Owner::watch`](super::Owner::watch).
    pub immediate: bool,
    /// Invoked right before the scheduler runs this watcher.
    pub before: Option<Hook>,
    /// Invoked once after the flush that ran this watcher completes.
    pub after_flush: Option<Hook>,
    /// Name used in error reports. Defaults to the path expression or id.
    pub label: Option<String>,
}

impl WatcherOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deep(mut self, deep: bool) -> Self {
        self.deep = deep;
        self
    }

    pub fn user(mut self, user: bool) -> Self {
        self.user = user;
        self
    }

    pub fn lazy(mut self, lazy: bool) -> Self {
        self.lazy = lazy;
        self
    }

    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn before(mut self, hook: impl Fn() + 'static) -> Self {
        self.before = Some(Rc::new(hook));
        self
    }

    pub fn after_flush(mut self, hook: impl Fn() + 'static) -> Self {
        self.after_flush = Some(Rc::new(hook));
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl fmt::Debug for WatcherOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatcherOptions")
            .field("deep", &self.deep)
            .field("user", &self.user)
            .field("lazy", &self.lazy)
            .field("sync", &self.sync)
            .field("immediate", &self.immediate)
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Deduplicated list of dependency nodes.
#[derive(Default)]
struct DepSet {
    ids: HashSet<DepId>,
    list: SmallVec<[Rc<Dep>; 4]>,
}

impl DepSet {
    fn insert(&mut self, dep: &Rc<Dep>) -> bool {
        if !self.ids.insert(dep.id()) {
            return false;
        }
        self.list.push(dep.clone());
        true
    }

    fn contains(&self, id: DepId) -> bool {
        self.ids.contains(&id)
    }

    fn clear(&mut self) {
        self.ids.clear();
        self.list.clear();
    }
}

pub(crate) struct WatcherInner {
    this: Weak<WatcherInner>,
    id: SubscriberId,
    target: Value,
    getter: Getter,
    callback: Option<Callback>,
    options: WatcherOptions,
    label: String,
    active: Cell<bool>,
    dirty: Cell<bool>,
    value: RefCell<Value>,
    deps: RefCell<DepSet>,
    new_deps: RefCell<DepSet>,
    owner: RefCell<Weak<OwnerInner>>,
}

/// Handle to a subscriber that evaluates a getter and reacts to changes.
///
/// Cloning clones the handle. When the last handle is dropped every node
/// subscription is released.
///
/// # Example
///
/// ```rust,ignore
/// let data = Value::from_json(&json!({ "a": 1 }));
/// observe(&data, false);
///
/// let watcher = Watcher::new(
///     data.clone(),
///     Getter::path("a"),
///     Some(Rc::new(|new, old| {
///         println!("a: {old} -> {new}");
///         Ok(())
///     })),
///     WatcherOptions::new().user(true),
/// )?;
/// ```
#[derive(Clone)]
pub struct Watcher(Rc<WatcherInner>);

impl Watcher {
    /// Create a watcher and, unless it is lazy, evaluate it once to collect
    /// its dependencies.
    ///
    /// Errors from the first evaluation are returned for non-user watchers.
    pub fn new(
        target: Value,
        getter: Getter,
        callback: Option<Callback>,
        options: WatcherOptions,
    ) -> Result<Self> {
        Self::with_owner(target, getter, callback, options, Weak::new())
    }

    pub(crate) fn with_owner(
        target: Value,
        getter: Getter,
        callback: Option<Callback>,
        options: WatcherOptions,
        owner: Weak<OwnerInner>,
    ) -> Result<Self> {
        let watcher = Self::build(target, getter, callback, options, owner);
        if !watcher.0.options.lazy {
            if let Some(value) = watcher.0.get()? {
                *watcher.0.value.borrow_mut() = value;
            }
        }
        Ok(watcher)
    }

    /// Create without evaluating.
    pub(crate) fn build(
        target: Value,
        getter: Getter,
        callback: Option<Callback>,
        options: WatcherOptions,
        owner: Weak<OwnerInner>,
    ) -> Self {
        let id = SubscriberId::new();
        let label = options
            .label
            .clone()
            .or_else(|| getter.expression().map(str::to_owned))
            .unwrap_or_else(|| id.to_string());
        let lazy = options.lazy;

        Self(Rc::new_cyclic(|this| WatcherInner {
            this: this.clone(),
            id,
            target,
            getter,
            callback,
            options,
            label,
            active: Cell::new(true),
            dirty: Cell::new(lazy),
            value: RefCell::new(Value::Undefined),
            deps: RefCell::new(DepSet::default()),
            new_deps: RefCell::new(DepSet::default()),
            owner: RefCell::new(owner),
        }))
    }

    pub fn id(&self) -> SubscriberId {
        self.0.id
    }

    pub fn label(&self) -> &str {
        &self.0.label
    }

    /// The cached value of the last successful evaluation.
    pub fn value(&self) -> Value {
        self.0.value.borrow().clone()
    }

    pub fn is_dirty(&self) -> bool {
        self.0.dirty.get()
    }

    pub fn is_active(&self) -> bool {
        self.0.active.get()
    }

    pub fn options(&self) -> &WatcherOptions {
        &self.0.options
    }

    /// Number of nodes this watcher is currently subscribed to.
    pub fn dep_count(&self) -> usize {
        self.0.deps.borrow().list.len()
    }

    /// Ids of the nodes this watcher is currently subscribed to.
    pub fn dep_ids(&self) -> Vec<DepId> {
        self.0.deps.borrow().list.iter().map(|dep| dep.id()).collect()
    }

    /// Re-evaluate unconditionally and clear the dirty flag.
    pub fn evaluate(&self) -> Result<Value> {
        if let Some(value) = self.0.get()? {
            *self.0.value.borrow_mut() = value;
        }
        self.0.dirty.set(false);
        Ok(self.value())
    }

    /// Re-evaluate only if a dependency changed since the last evaluation.
    pub fn evaluate_if_dirty(&self) -> Result<Value> {
        if self.0.dirty.get() {
            self.evaluate()
        } else {
            Ok(self.value())
        }
    }

    /// Make the currently evaluating subscriber (if any) depend on every
    /// node this watcher depends on.
    pub fn depend_on_all(&self) {
        let deps: SmallVec<[Rc<Dep>; 4]> = self.0.deps.borrow().list.clone();
        for dep in deps {
            dep.depend();
        }
    }

    /// Run as the scheduler would: re-evaluate and fire the callback if the
    /// value changed.
    pub fn run(&self) -> Result<()> {
        self.0.run()
    }

    /// Unsubscribe from every node and stop reacting. Idempotent.
    pub fn teardown(&self) {
        self.0.teardown();
    }

    pub fn as_subscriber(&self) -> Rc<dyn Subscriber> {
        self.0.clone()
    }

    pub(crate) fn callback(&self) -> Option<&Callback> {
        self.0.callback.as_ref()
    }
}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("id", &self.0.id)
            .field("label", &self.0.label)
            .field("active", &self.0.active.get())
            .field("dirty", &self.0.dirty.get())
            .field("deps", &self.dep_count())
            .finish()
    }
}

impl WatcherInner {
    /// Evaluate the getter while collecting dependencies.
    ///
    /// `Ok(None)` means a user getter failed and the error was reported.
    fn get(&self) -> Result<Option<Value>> {
        let result = {
            let _ctx = match self.this.upgrade() {
                Some(this) => ReactiveContext::enter(this),
                None => ReactiveContext::suspend(),
            };
            let result = self.getter.call(&self.target);
            if self.options.deep {
                if let Ok(value) = &result {
                    traverse(value);
                }
            }
            result
        };
        self.cleanup_deps();

        match result {
            Ok(value) => Ok(Some(value)),
            Err(err) if self.options.user => {
                report(&err, &format!("getter for watcher \"{}\"", self.label));
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Release nodes the last evaluation did not read, then commit.
    fn cleanup_deps(&self) {
        let mut deps = self.deps.borrow_mut();
        let mut new_deps = self.new_deps.borrow_mut();
        for dep in &deps.list {
            if !new_deps.contains(dep.id()) {
                dep.remove_sub(self.id);
            }
        }
        std::mem::swap(&mut *deps, &mut *new_deps);
        new_deps.clear();
    }

    fn teardown(&self) {
        if !self.active.get() {
            return;
        }
        let owner = self.owner.borrow().upgrade();
        if let Some(owner) = owner {
            if !owner.is_being_destroyed() {
                owner.forget(self.id);
            }
        }

        let deps = std::mem::take(&mut *self.deps.borrow_mut());
        for dep in &deps.list {
            dep.remove_sub(self.id);
        }
        self.active.set(false);
    }
}

impl Subscriber for WatcherInner {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn add_dep(&self, dep: &Rc<Dep>) {
        if !self.new_deps.borrow_mut().insert(dep) {
            return;
        }
        if !self.deps.borrow().contains(dep.id()) {
            let this: Weak<dyn Subscriber> = self.this.clone();
            dep.add_sub(self.id, this);
        }
    }

    fn update(&self) {
        if !self.active.get() {
            return;
        }
        if self.options.lazy {
            self.dirty.set(true);
        } else if self.options.sync {
            if let Err(err) = self.run() {
                report(&err, &format!("sync run of watcher \"{}\"", self.label));
            }
        } else if let Some(this) = self.this.upgrade() {
            schedule_flush(this);
        }
    }

    fn run(&self) -> Result<()> {
        if !self.active.get() {
            return Ok(());
        }
        let Some(value) = self.get()? else {
            return Ok(());
        };

        let changed = !value.same_value(&self.value.borrow())
            || value.is_container()
            || self.options.deep;
        if !changed {
            return Ok(());
        }

        let old = self.value.replace(value.clone());
        if let Some(callback) = &self.callback {
            if let Err(err) = callback(&value, &old) {
                if !self.options.user {
                    return Err(err);
                }
                report(&err, &format!("callback for watcher \"{}\"", self.label));
            }
        }
        Ok(())
    }

    fn before_run(&self) {
        if let Some(hook) = &self.options.before {
            hook();
        }
    }

    fn after_flush(&self) {
        if let Some(hook) = &self.options.after_flush {
            hook();
        }
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}

impl Drop for WatcherInner {
    fn drop(&mut self) {
        for set in [self.deps.get_mut(), self.new_deps.get_mut()] {
            for dep in &set.list {
                dep.remove_sub(self.id);
            }
        }
    }
}
