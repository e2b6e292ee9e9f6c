use std::cell::Cell;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use log::trace;
use crate::dep::Dep;
use crate::reactor::Reactor;
use crate::value::{List, Object, Value};

/// Called before a reactive field is written, in development mode only. Used to warn about
/// writes that are allowed but probably wrong (mutating a prop, an injected value...).
pub type CustomSetter = Rc<dyn Fn(&Reactor)>;

/// The marker attached to an observed [Object] or [List].
///
/// Its dep is notified on structural changes (keys added or removed, list mutated), which
/// is how watchers see changes that don't go through an existing field.
#[derive(Clone)]
pub struct Observer(Rc<ObserverInner>);

struct ObserverInner {
    dep: Dep,
    /// Number of instances using the container as root data.
    vm_count: Cell<usize>,
}

impl Observer {
    fn new() -> Self {
        Observer(Rc::new(ObserverInner {
            dep: Dep::new(),
            vm_count: Cell::new(0),
        }))
    }

    pub fn dep(&self) -> &Dep {
        &self.0.dep
    }

    pub fn vm_count(&self) -> usize {
        self.0.vm_count.get()
    }

    pub(crate) fn release_root(&self) {
        self.0.vm_count.set(self.0.vm_count.get().saturating_sub(1));
    }

    pub fn ptr_eq(&self, other: &Observer) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Debug for Observer {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("dep", &self.0.dep)
            .field("vm_count", &self.0.vm_count.get())
            .finish()
    }
}

/// Observe `value`, converting every field (recursively) into a reactive slot.
///
/// Returns `None` for primitives. An already observed container keeps its marker and is
/// returned as-is. New markers are only created while observation is enabled (see
/// [Reactor::toggle_observing]) and never on frozen containers.
///
/// `as_root` marks the container as an instance's root data.
pub fn observe(rx: &Reactor, value: &Value, as_root: bool) -> Option<Observer> {
    let ob = match value {
        Value::Object(object) => observe_object(rx, object),
        Value::List(list) => observe_list(rx, list),
        _ => return None,
    };
    if as_root {
        if let Some(ob) = &ob {
            ob.0.vm_count.set(ob.0.vm_count.get() + 1);
        }
    }
    ob
}

fn observe_object(rx: &Reactor, object: &Object) -> Option<Observer> {
    if let Some(ob) = object.observer() {
        return Some(ob);
    }
    if !rx.should_observe() || object.is_frozen() {
        return None;
    }
    // Mark first so cyclic structures terminate.
    let ob = Observer::new();
    object.set_observer(ob.clone());
    trace!("observing object {:?}", object.id());
    for (key, value) in object.plain_entries() {
        define_reactive(rx, object, &key, value, None, false);
    }
    Some(ob)
}

fn observe_list(rx: &Reactor, list: &List) -> Option<Observer> {
    if let Some(ob) = list.observer() {
        return Some(ob);
    }
    if !rx.should_observe() || list.is_frozen() {
        return None;
    }
    let ob = Observer::new();
    list.set_observer(ob.clone());
    trace!("observing list {:?}", list.id());
    observe_items(rx, &list.to_vec());
    Some(ob)
}

pub(crate) fn observe_items(rx: &Reactor, items: &[Value]) {
    for item in items {
        observe(rx, item, false);
    }
}

/// Turn `key` of `object` into a reactive field holding `value`.
///
/// Unless `shallow`, `value` is observed too and reads of the field also depend on the
/// value's marker. `custom_setter` runs before each write in development mode.
/// Frozen objects are left untouched.
pub fn define_reactive(
    rx: &Reactor,
    object: &Object,
    key: &str,
    value: Value,
    custom_setter: Option<CustomSetter>,
    shallow: bool,
) {
    if object.is_frozen() {
        return;
    }
    if !shallow {
        observe(rx, &value, false);
    }
    object.install_reactive(key, value, shallow, custom_setter);
}

/// Depend on the markers of every observed element of `list`, recursing into nested lists,
/// since list elements can't be intercepted individually.
pub(crate) fn depend_array(rx: &Reactor, list: &List) {
    for item in list.to_vec() {
        if let Some(ob) = item.observer() {
            ob.dep().depend(rx);
        }
        if let Value::List(inner) = &item {
            if !inner.ptr_eq(list) {
                depend_array(rx, inner);
            }
        }
    }
}
