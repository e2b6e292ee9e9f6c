use mini_observe::*;
use test_log::test;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn observed<K: Into<String>, V: Into<Value>>(rx: &Reactor, entries: impl IntoIterator<Item = (K, V)>) -> Object {
    let object: Object = entries.into_iter().collect();
    observe(rx, &Value::Object(object.clone()), false);
    object
}

fn number(value: &Value) -> f64 {
    value.as_number().unwrap_or(f64::NAN)
}

fn sum(rx: &Reactor, state: &Object, runs: &Cell<usize>) -> anyhow::Result<Value> {
    runs.set(runs.get() + 1);
    Ok(Value::from(number(&state.get(rx, "a")) + number(&state.get(rx, "b"))))
}

#[test]
fn test_computed_caches() {
    let rx = Reactor::new();
    let state = observed(&rx, [("a", 1), ("b", 2)]);
    let runs = Rc::new(Cell::new(0));
    let (state2, runs2) = (state.clone(), runs.clone());
    let computed = Computed::new(&rx, None, move |rx| sum(rx, &state2, &runs2)).unwrap();
    assert!(computed.is_dirty());
    assert_eq!(runs.get(), 0);

    for _ in 0..5 {
        assert_eq!(computed.get(&rx).unwrap(), Value::from(3));
    }
    assert_eq!(runs.get(), 1);
}

#[test]
fn test_computed_dirty_without_rerun() {
    let rx = Reactor::new();
    let state = observed(&rx, [("a", 1), ("b", 2)]);
    let runs = Rc::new(Cell::new(0));
    let (state2, runs2) = (state.clone(), runs.clone());
    let computed = Computed::new(&rx, None, move |rx| sum(rx, &state2, &runs2)).unwrap();
    assert_eq!(computed.get(&rx).unwrap(), Value::from(3));

    state.set(&rx, "a", Value::from(10));
    state.set(&rx, "b", Value::from(20));
    assert!(computed.is_dirty());
    assert_eq!(runs.get(), 1);
    assert_eq!(rx.queued_count(), 0);

    assert_eq!(computed.get(&rx).unwrap(), Value::from(30));
    assert!(!computed.is_dirty());
    assert_eq!(runs.get(), 2);
}

#[test]
fn test_computed_chain() {
    let rx = Reactor::new();
    let state = observed(&rx, [("a", 1), ("b", 2)]);
    let runs = Rc::new(Cell::new(0));
    let (state2, runs2) = (state.clone(), runs.clone());
    let total = Computed::new(&rx, None, move |rx| sum(rx, &state2, &runs2)).unwrap();
    let total2 = total.clone();
    let doubled = Computed::labeled(&rx, None, "doubled", move |rx| Ok(Value::from(number(&total2.get(rx)?) * 2.0))).unwrap();

    let seen = Rc::new(RefCell::new(Vec::new()));
    let (doubled2, seen2) = (doubled.clone(), seen.clone());
    let _watcher = Watcher::new(&rx, None, Expr::getter(move |rx| {
        let value = doubled2.get(rx)?;
        seen2.borrow_mut().push(number(&value));
        Ok(value)
    }), None, WatchOptions::default()).unwrap();
    assert_eq!(*seen.borrow(), vec![6.0]);

    state.set(&rx, "b", Value::from(4));
    assert!(total.is_dirty());
    assert!(doubled.is_dirty());
    rx.flush().unwrap();
    assert_eq!(*seen.borrow(), vec![6.0, 10.0]);
    assert_eq!(runs.get(), 2);
}

#[test]
fn test_computed_error() {
    let rx = Reactor::new();
    let computed = Computed::labeled(&rx, None, "broken", |_| Err(anyhow::anyhow!("boom"))).unwrap();
    match computed.get(&rx) {
        Err(Error::Evaluation { expression, source }) => {
            assert_eq!(expression, "broken");
            assert_eq!(source.to_string(), "boom");
        }
        other => panic!("expected an evaluation error, got {:?}", other),
    }
    assert!(rx.current_target().is_none());
}

#[test]
fn test_computed_setter() {
    let warnings = Rc::new(RefCell::new(Vec::<String>::new()));
    let warnings2 = warnings.clone();
    let rx = Reactor::with_config(Config::default().with_warn_handler(move |msg, _| warnings2.borrow_mut().push(msg.to_owned())));
    let state = observed(&rx, [("a", 1)]);

    let state2 = state.clone();
    let state3 = state.clone();
    let settable = Computed::new(&rx, None, move |rx| Ok(state2.get(rx, "a")))
        .unwrap()
        .with_setter(move |rx, value| {
            state3.set(rx, "a", value);
            Ok(())
        });
    assert!(settable.has_setter());
    settable.set(&rx, Value::from(5));
    assert_eq!(state.peek("a"), Value::from(5));
    assert_eq!(settable.get(&rx).unwrap(), Value::from(5));
    assert!(warnings.borrow().is_empty());

    let state4 = state.clone();
    let read_only = Computed::labeled(&rx, None, "readOnly", move |rx| Ok(state4.get(rx, "a"))).unwrap();
    read_only.set(&rx, Value::from(6));
    assert_eq!(state.peek("a"), Value::from(5));
    assert_eq!(warnings.borrow().len(), 1);
    assert!(warnings.borrow()[0].contains("readOnly"));
}
