use std::rc::Rc;
use derivative::Derivative;
use crate::error::Result;
use crate::instance::Instance;
use crate::reactor::Reactor;
use crate::value::Value;
use crate::watcher::{Expr, WatchOptions, Watcher};

/// Called when a value is assigned to a computed value.
pub type ComputedSetter = Rc<dyn Fn(&Reactor, Value) -> anyhow::Result<()>>;

/// A memoized value derived from reactive state.
///
/// Backed by a lazy [Watcher]: a change to any input only marks it dirty, and the getter
/// re-runs on the next [Computed::get]. Reading while clean returns the cached value without
/// running the getter.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct Computed {
    watcher: Watcher,
    #[derivative(Debug = "ignore")]
    setter: Option<ComputedSetter>,
}

impl Computed {
    pub fn new(
        rx: &Reactor,
        owner: Option<&Instance>,
        getter: impl Fn(&Reactor) -> anyhow::Result<Value> + 'static,
    ) -> Result<Computed> {
        Self::from_expr(rx, owner, Expr::getter(getter))
    }

    /// Like [Computed::new], with a label used in diagnostics.
    pub fn labeled(
        rx: &Reactor,
        owner: Option<&Instance>,
        label: impl Into<String>,
        getter: impl Fn(&Reactor) -> anyhow::Result<Value> + 'static,
    ) -> Result<Computed> {
        Self::from_expr(rx, owner, Expr::labeled(label, getter))
    }

    fn from_expr(rx: &Reactor, owner: Option<&Instance>, expr: Expr) -> Result<Computed> {
        let watcher = Watcher::new(rx, owner, expr, None, WatchOptions::lazy())?;
        Ok(Computed { watcher, setter: None })
    }

    pub fn with_setter(mut self, setter: impl Fn(&Reactor, Value) -> anyhow::Result<()> + 'static) -> Self {
        self.setter = Some(Rc::new(setter));
        self
    }

    /// The current value: re-evaluated only if an input changed since the last read.
    ///
    /// If a watcher is being evaluated, it is made to depend on this value's inputs.
    pub fn get(&self, rx: &Reactor) -> Result<Value> {
        if self.watcher.is_dirty() {
            self.watcher.evaluate(rx)?;
        }
        if rx.has_target() {
            self.watcher.depend(rx);
        }
        Ok(self.watcher.value())
    }

    /// Assign through the setter. Without a setter this only warns.
    pub fn set(&self, rx: &Reactor, value: Value) {
        let owner = self.watcher.owner();
        match &self.setter {
            Some(setter) => {
                if let Err(err) = setter(rx, value) {
                    let label = format!("setter for computed \"{}\"", self.watcher.expression());
                    rx.handle_error(&err, owner.as_ref(), &label);
                }
            }
            None => rx.warn(
                &format!("Computed property \"{}\" was assigned to but it has no setter.", self.watcher.expression()),
                owner.as_ref(),
            ),
        }
    }

    pub fn has_setter(&self) -> bool {
        self.setter.is_some()
    }

    pub fn is_dirty(&self) -> bool {
        self.watcher.is_dirty()
    }

    pub fn watcher(&self) -> &Watcher {
        &self.watcher
    }
}
