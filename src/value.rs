use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use derivative::Derivative;
use crate::dep::Dep;
use crate::observer::{define_reactive, depend_array, observe, observe_items, CustomSetter, Observer};
use crate::reactor::Reactor;
use crate::uid::ContainerId;

/// A dynamically-typed value which can be stored in an [Object] or a [List].
///
/// Containers are shared handles: cloning a `Value::Object` aliases the same object.
///
/// Equality is *strict* equality: primitives compare by value, strings by contents, containers
/// by identity. Unlike `f64`, `NaN` equals `NaN`, so writing `NaN` over `NaN` is not a change.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    List(List),
    Object(Object),
}

/// A record of string-keyed fields.
///
/// Until it's observed (see [crate::observe]) an object is plain data: reads and writes go
/// straight to storage. Once observed, every field is a reactive slot: [Object::get] records
/// the read on the active watcher and [Object::set] notifies the field's subscribers.
#[derive(Clone)]
pub struct Object(Rc<ObjectInner>);

struct ObjectInner {
    id: ContainerId,
    slots: RefCell<BTreeMap<String, Slot>>,
    ob: RefCell<Option<Observer>>,
    frozen: Cell<bool>,
}

#[derive(Debug)]
struct Slot {
    value: Value,
    reactive: Option<ReactiveSlot>,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct ReactiveSlot {
    /// Created on the first tracked read.
    dep: Option<Dep>,
    shallow: bool,
    #[derivative(Debug = "ignore")]
    custom_setter: Option<CustomSetter>,
}

/// An ordered list of values.
///
/// Elements are not individually reactive. Reading an element isn't tracked; a watcher
/// depends on a list through the reactive field holding it. Every mutating method notifies
/// the list's marker dep when the list is observed, and observes inserted elements.
#[derive(Clone)]
pub struct List(Rc<ListInner>);

struct ListInner {
    id: ContainerId,
    items: RefCell<Vec<Value>>,
    ob: RefCell<Option<Observer>>,
    frozen: Cell<bool>,
}

enum Write {
    Reactive {
        dep: Option<Dep>,
        shallow: bool,
        custom_setter: Option<CustomSetter>,
    },
    Plain,
    Missing,
}

impl Value {
    pub fn str(s: &str) -> Value {
        Value::Str(Rc::from(s))
    }

    /// Strict equality, except `NaN` equals `NaN`.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => a.ptr_eq(b),
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, Value::List(_) | Value::Object(_))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// The container's marker, if this is an observed container.
    pub fn observer(&self) -> Option<Observer> {
        match self {
            Value::List(list) => list.observer(),
            Value::Object(object) => object.observer(),
            _ => None,
        }
    }

    pub fn container_id(&self) -> Option<ContainerId> {
        match self {
            Value::List(list) => Some(list.id()),
            Value::Object(object) => Some(object.id()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&List> {
        match self {
            Value::List(list) => Some(list),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same_value(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::str(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Object> for Value {
    fn from(object: Object) -> Self {
        Value::Object(object)
    }
}

impl From<List> for Value {
    fn from(list: List) -> Self {
        Value::List(list)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

// region Object

impl Object {
    pub fn new() -> Self {
        Object(Rc::new(ObjectInner {
            id: ContainerId::next(),
            slots: RefCell::new(BTreeMap::new()),
            ob: RefCell::new(None),
            frozen: Cell::new(false),
        }))
    }

    pub fn id(&self) -> ContainerId {
        self.0.id
    }

    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Read a field. Missing fields read as [Value::Undefined].
    ///
    /// If the field is reactive and a watcher is being evaluated, the read is recorded: the
    /// watcher subscribes to the field's dep, and to the value's marker dep if the value is an
    /// observed container (so that adding keys or mutating a list is seen as a change).
    pub fn get(&self, rx: &Reactor, key: &str) -> Value {
        let (value, dep, shallow) = {
            let mut slots = self.0.slots.borrow_mut();
            let Some(slot) = slots.get_mut(key) else {
                return Value::Undefined;
            };
            match &mut slot.reactive {
                Some(reactive) if rx.has_target() => {
                    let dep = reactive.dep.get_or_insert_with(Dep::new).clone();
                    (slot.value.clone(), dep, reactive.shallow)
                }
                _ => return slot.value.clone(),
            }
        };
        dep.depend(rx);
        if !shallow {
            if let Some(child_ob) = value.observer() {
                child_ob.dep().depend(rx);
                if let Value::List(list) = &value {
                    depend_array(rx, list);
                }
            }
        }
        value
    }

    /// Read a field without recording anything.
    pub fn peek(&self, key: &str) -> Value {
        self.0.slots.borrow().get(key).map_or(Value::Undefined, |slot| slot.value.clone())
    }

    /// Write a field.
    ///
    /// - Reactive field: writing a value equal to the current one (see [Value::same_value])
    ///   does nothing. Otherwise the value is stored, observed (unless the field is shallow),
    ///   and the field's subscribers are notified.
    /// - Plain field: the value is stored.
    /// - New field on an observed object: the field is added as reactive and the object's
    ///   marker dep is notified. Refused with a warning on an instance's root data.
    /// - New field on a plain object: stored as plain.
    pub fn set(&self, rx: &Reactor, key: &str, value: Value) {
        let write = match self.0.slots.borrow().get(key) {
            Some(Slot { value: current, reactive: Some(reactive) }) => {
                if current.same_value(&value) {
                    return;
                }
                Write::Reactive {
                    dep: reactive.dep.clone(),
                    shallow: reactive.shallow,
                    custom_setter: reactive.custom_setter.clone(),
                }
            }
            Some(_) => Write::Plain,
            None => Write::Missing,
        };
        match write {
            Write::Reactive { dep, shallow, custom_setter } => {
                if let Some(custom_setter) = custom_setter {
                    if !rx.config().production {
                        custom_setter(rx);
                    }
                }
                if let Some(slot) = self.0.slots.borrow_mut().get_mut(key) {
                    slot.value = value.clone();
                }
                if !shallow {
                    observe(rx, &value, false);
                }
                if let Some(dep) = dep {
                    dep.notify(rx);
                }
            }
            Write::Plain => {
                if self.check_writable(rx, key) {
                    if let Some(slot) = self.0.slots.borrow_mut().get_mut(key) {
                        slot.value = value;
                    }
                }
            }
            Write::Missing => self.add_field(rx, key, value),
        }
    }

    fn add_field(&self, rx: &Reactor, key: &str, value: Value) {
        if !self.check_writable(rx, key) {
            return;
        }
        match self.observer() {
            Some(ob) if ob.vm_count() > 0 => {
                rx.warn(
                    &format!("Avoid adding reactive property \"{}\" to an instance or its root data at runtime - declare it upfront in the data table.", key),
                    None,
                );
            }
            Some(ob) => {
                define_reactive(rx, self, key, value, None, false);
                ob.dep().notify(rx);
            }
            None => {
                self.0.slots.borrow_mut().insert(key.to_owned(), Slot { value, reactive: None });
            }
        }
    }

    /// Remove a field. On an observed object this notifies the marker dep.
    ///
    /// Returns whether the field existed.
    pub fn delete(&self, rx: &Reactor, key: &str) -> bool {
        if !self.check_writable(rx, key) {
            return false;
        }
        let ob = self.observer();
        if let Some(ob) = &ob {
            if ob.vm_count() > 0 {
                rx.warn(
                    &format!("Avoid deleting property \"{}\" on an instance or its root data - just set it to undefined.", key),
                    None,
                );
                return false;
            }
        }
        let removed = self.0.slots.borrow_mut().remove(key).is_some();
        if removed {
            if let Some(ob) = ob {
                ob.dep().notify(rx);
            }
        }
        removed
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.slots.borrow().contains_key(key)
    }

    pub fn is_reactive(&self, key: &str) -> bool {
        self.0.slots.borrow().get(key).map_or(false, |slot| slot.reactive.is_some())
    }

    /// Field names, in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.0.slots.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make the object immutable: it will never be observed, and fields can't be added,
    /// removed or written unless they're already reactive.
    pub fn freeze(&self) {
        self.0.frozen.set(true);
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.get()
    }

    /// The object's marker, if it's observed.
    pub fn observer(&self) -> Option<Observer> {
        self.0.ob.borrow().clone()
    }

    pub(crate) fn set_observer(&self, ob: Observer) {
        *self.0.ob.borrow_mut() = Some(ob);
    }

    /// The dep of a reactive field, if the field has been read by a watcher.
    pub fn field_dep(&self, key: &str) -> Option<Dep> {
        self.0.slots.borrow().get(key).and_then(|slot| slot.reactive.as_ref()?.dep.clone())
    }

    /// Snapshot of every field which isn't reactive yet.
    pub(crate) fn plain_entries(&self) -> Vec<(String, Value)> {
        self.0.slots.borrow()
            .iter()
            .filter(|(_, slot)| slot.reactive.is_none())
            .map(|(key, slot)| (key.clone(), slot.value.clone()))
            .collect()
    }

    /// Install (or reinstall) `key` as a reactive slot. A reinstalled slot keeps its dep, so
    /// existing subscribers stay subscribed.
    pub(crate) fn install_reactive(&self, key: &str, value: Value, shallow: bool, custom_setter: Option<CustomSetter>) {
        let mut slots = self.0.slots.borrow_mut();
        let dep = slots.get_mut(key).and_then(|slot| slot.reactive.take()).and_then(|reactive| reactive.dep);
        slots.insert(key.to_owned(), Slot {
            value,
            reactive: Some(ReactiveSlot { dep, shallow, custom_setter }),
        });
    }

    fn check_writable(&self, rx: &Reactor, key: &str) -> bool {
        if self.is_frozen() {
            rx.warn(&format!("Cannot assign to property \"{}\" of a frozen object", key), None);
            return false;
        }
        true
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let object = Object::new();
        {
            let mut slots = object.0.slots.borrow_mut();
            for (key, value) in iter {
                slots.insert(key.into(), Slot { value: value.into(), reactive: None });
            }
        }
        object
    }
}

impl Debug for Object {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // Fields aren't printed: objects can be cyclic.
        f.debug_struct("Object")
            .field("id", &self.0.id)
            .field("keys", &self.keys())
            .field("observed", &self.0.ob.borrow().is_some())
            .finish()
    }
}

// endregion

// region List

impl List {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        List(Rc::new(ListInner {
            id: ContainerId::next(),
            items: RefCell::new(items),
            ob: RefCell::new(None),
            frozen: Cell::new(false),
        }))
    }

    pub fn id(&self) -> ContainerId {
        self.0.id
    }

    pub fn ptr_eq(&self, other: &List) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn len(&self) -> usize {
        self.0.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read an element (not tracked).
    pub fn get(&self, index: usize) -> Value {
        self.0.items.borrow().get(index).cloned().unwrap_or_default()
    }

    pub fn to_vec(&self) -> Vec<Value> {
        self.0.items.borrow().clone()
    }

    pub fn push(&self, rx: &Reactor, value: Value) {
        if !self.check_writable(rx) {
            return;
        }
        self.0.items.borrow_mut().push(value.clone());
        self.mutated(rx, &[value]);
    }

    pub fn pop(&self, rx: &Reactor) -> Option<Value> {
        if !self.check_writable(rx) {
            return None;
        }
        let popped = self.0.items.borrow_mut().pop();
        self.mutated(rx, &[]);
        popped
    }

    /// Remove and return the first element.
    pub fn shift(&self, rx: &Reactor) -> Option<Value> {
        if !self.check_writable(rx) {
            return None;
        }
        let shifted = {
            let mut items = self.0.items.borrow_mut();
            if items.is_empty() { None } else { Some(items.remove(0)) }
        };
        self.mutated(rx, &[]);
        shifted
    }

    /// Insert `values` at the front.
    pub fn unshift(&self, rx: &Reactor, values: Vec<Value>) {
        if !self.check_writable(rx) {
            return;
        }
        self.0.items.borrow_mut().splice(0..0, values.iter().cloned());
        self.mutated(rx, &values);
    }

    /// Remove `delete_count` elements starting at `start`, insert `values` there, and return
    /// the removed elements. Out-of-range bounds are clamped.
    pub fn splice(&self, rx: &Reactor, start: usize, delete_count: usize, values: Vec<Value>) -> Vec<Value> {
        if !self.check_writable(rx) {
            return Vec::new();
        }
        let removed = {
            let mut items = self.0.items.borrow_mut();
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            items.splice(start..end, values.iter().cloned()).collect::<Vec<_>>()
        };
        self.mutated(rx, &values);
        removed
    }

    /// Replace the element at `index`, padding with [Value::Undefined] if `index` is past the
    /// end. This is the reactive way to write an element.
    pub fn set(&self, rx: &Reactor, index: usize, value: Value) {
        if !self.check_writable(rx) {
            return;
        }
        let Some(min_len) = index.checked_add(1) else {
            rx.warn(&format!("List index {} is out of range", index), None);
            return;
        };
        {
            let mut items = self.0.items.borrow_mut();
            if items.len() < min_len {
                items.resize(min_len, Value::Undefined);
            }
            items[index] = value.clone();
        }
        self.mutated(rx, &[value]);
    }

    pub fn reverse(&self, rx: &Reactor) {
        if !self.check_writable(rx) {
            return;
        }
        self.0.items.borrow_mut().reverse();
        self.mutated(rx, &[]);
    }

    pub fn sort_by(&self, rx: &Reactor, compare: impl FnMut(&Value, &Value) -> Ordering) {
        if !self.check_writable(rx) {
            return;
        }
        self.0.items.borrow_mut().sort_by(compare);
        self.mutated(rx, &[]);
    }

    pub fn clear(&self, rx: &Reactor) {
        if !self.check_writable(rx) {
            return;
        }
        self.0.items.borrow_mut().clear();
        self.mutated(rx, &[]);
    }

    /// Make the list immutable: it will never be observed and mutators become no-ops.
    pub fn freeze(&self) {
        self.0.frozen.set(true);
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.get()
    }

    pub fn observer(&self) -> Option<Observer> {
        self.0.ob.borrow().clone()
    }

    pub(crate) fn set_observer(&self, ob: Observer) {
        *self.0.ob.borrow_mut() = Some(ob);
    }

    fn mutated(&self, rx: &Reactor, inserted: &[Value]) {
        if let Some(ob) = self.observer() {
            observe_items(rx, inserted);
            ob.dep().notify(rx);
        }
    }

    fn check_writable(&self, rx: &Reactor) -> bool {
        if self.is_frozen() {
            rx.warn("Cannot mutate a frozen list", None);
            return false;
        }
        true
    }
}

impl Default for List {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Into<Value>> FromIterator<V> for List {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        List::from_vec(iter.into_iter().map(Into::into).collect())
    }
}

impl Debug for List {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("List")
            .field("id", &self.0.id)
            .field("len", &self.len())
            .field("observed", &self.0.ob.borrow().is_some())
            .finish()
    }
}

// endregion
