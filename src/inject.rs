use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use log::trace;
use crate::instance::Instance;
use crate::observer::{define_reactive, CustomSetter};
use crate::reactor::Reactor;
use crate::value::Value;

/// Fallback for an injection no ancestor provides.
#[derive(Clone)]
pub enum InjectDefault {
    Value(Value),
    /// Evaluated against the injecting instance, once per resolution.
    Factory(Rc<dyn Fn(&Instance) -> Value>),
}

/// One requested injection: bind `key` on the instance to the nearest provided `from`.
#[derive(Debug, Clone)]
pub struct Injection {
    pub key: String,
    pub from: String,
    pub default: Option<InjectDefault>,
}

impl Injection {
    /// Inject `key` from the provided entry of the same name.
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Injection { from: key.clone(), key, default: None }
    }

    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(InjectDefault::Value(default.into()));
        self
    }

    pub fn with_default_factory(mut self, factory: impl Fn(&Instance) -> Value + 'static) -> Self {
        self.default = Some(InjectDefault::Factory(Rc::new(factory)));
        self
    }
}

impl Debug for InjectDefault {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            InjectDefault::Value(value) => f.debug_tuple("Value").field(value).finish(),
            InjectDefault::Factory(_) => f.write_str("Factory"),
        }
    }
}

/// Resolve `injections` against the provided maps of `instance` and its ancestors.
///
/// Each key is looked up from `instance`'s parent upward and the nearest provider wins; an
/// instance never injects from its own provided map. Keys no
/// ancestor provides fall back to their default, or warn and resolve to [Value::Undefined].
/// Resolution isn't tracked: it reads the provided maps directly.
pub fn resolve_inject(rx: &Reactor, injections: &[Injection], instance: &Instance) -> BTreeMap<String, Value> {
    let mut result = BTreeMap::new();
    for injection in injections {
        let value = match find_provided(instance, &injection.from) {
            Some((provider, value)) => {
                trace!("injection \"{}\" of <{}> provided by <{}>", injection.key, instance.name(), provider.name());
                value
            }
            None => match &injection.default {
                Some(InjectDefault::Value(value)) => value.clone(),
                Some(InjectDefault::Factory(factory)) => factory(instance),
                None => {
                    rx.warn(&format!("Injection \"{}\" not found", injection.key), Some(instance));
                    Value::Undefined
                }
            },
        };
        result.insert(injection.key.clone(), value);
    }
    result
}

fn find_provided(instance: &Instance, key: &str) -> Option<(Instance, Value)> {
    let mut current = instance.parent();
    while let Some(node) = current {
        if let Some(value) = node.provided_value(key) {
            return Some((node.clone(), value));
        }
        current = node.parent();
    }
    None
}

impl Instance {
    /// Make `entries` available to this instance's descendants. Replaces any previously
    /// provided map.
    pub fn provide<K: Into<String>, V: Into<Value>>(&self, entries: impl IntoIterator<Item = (K, V)>) {
        let provided = entries.into_iter().map(|(key, value)| (key.into(), value.into())).collect();
        *self.provided().borrow_mut() = Some(provided);
    }

    /// Stop providing anything.
    pub fn clear_provided(&self) {
        *self.provided().borrow_mut() = None;
    }

    /// The value this instance itself provides under `key`.
    pub fn provided_value(&self, key: &str) -> Option<Value> {
        self.provided().borrow().as_ref().and_then(|provided| provided.get(key).cloned())
    }

    /// Resolve `injections` and install the results as reactive fields of this instance.
    ///
    /// The fields are shallow: neither the injected values nor values assigned later are
    /// observed. Assigning to an injected field works but warns, since the provider may
    /// overwrite it.
    pub fn init_injections(&self, rx: &Reactor, injections: &[Injection]) {
        let resolved = resolve_inject(rx, injections, self);
        rx.without_observing(|| {
            for (key, value) in resolved {
                define_reactive(rx, self.own_fields(), &key, value, Some(self.injection_mutation_warning(&key)), true);
                self.bind_own(&key);
            }
        });
    }

    fn injection_mutation_warning(&self, key: &str) -> CustomSetter {
        let instance = self.downgrade();
        let key = key.to_owned();
        Rc::new(move |rx: &Reactor| {
            rx.warn(
                &format!("Injected value \"{}\" was mutated directly; the provider may overwrite it.", key),
                instance.upgrade().as_ref(),
            );
        })
    }
}
