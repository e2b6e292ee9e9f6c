use mini_observe::*;
use test_log::test;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// A development-mode reactor which records every warning.
fn recording_reactor() -> (Reactor, Rc<RefCell<Vec<String>>>) {
    let warnings = Rc::new(RefCell::new(Vec::new()));
    let warnings2 = warnings.clone();
    let rx = Reactor::with_config(Config::default().with_warn_handler(move |msg, _| warnings2.borrow_mut().push(msg.to_owned())));
    (rx, warnings)
}

fn number(value: &Value) -> f64 {
    value.as_number().unwrap_or(f64::NAN)
}

#[test]
fn test_data_proxy_and_watch() {
    let (rx, warnings) = recording_reactor();
    let root = Instance::new(None, "Root");
    root.init_data(&rx, [("msg", "hi")].into_iter().collect());
    assert!(root.has("msg"));
    assert_eq!(root.get(&rx, "msg"), Value::from("hi"));

    let changes = Rc::new(RefCell::new(Vec::new()));
    let changes2 = changes.clone();
    let unwatch = root.watch(&rx, "msg", move |_, new, old| {
        changes2.borrow_mut().push((new.clone(), old.clone()));
        Ok(())
    }, WatchOptions::default()).unwrap();
    assert!(unwatch.watcher().options().user);

    root.set(&rx, "msg", Value::from("bye"));
    rx.flush().unwrap();
    assert_eq!(*changes.borrow(), vec![(Value::from("bye"), Value::from("hi"))]);

    unwatch.unwatch();
    assert!(root.watchers().is_empty());
    root.set(&rx, "msg", Value::from("again"));
    rx.flush().unwrap();
    assert_eq!(changes.borrow().len(), 1);
    assert!(warnings.borrow().is_empty());
}

#[test]
fn test_nested_path_watch() {
    let rx = Reactor::new();
    let root = Instance::new(None, "Root");
    let user: Object = [("name", "ann")].into_iter().collect();
    let tags: List = ["a", "b"].into_iter().collect();
    root.init_data(&rx, [("user", Value::from(user.clone())), ("tags", Value::from(tags.clone()))].into_iter().collect());

    let names = Rc::new(RefCell::new(Vec::new()));
    let names2 = names.clone();
    root.watch(&rx, "user.name", move |_, new, _| {
        names2.borrow_mut().push(new.as_str().unwrap_or_default().to_owned());
        Ok(())
    }, WatchOptions::default()).unwrap();

    let lengths = Rc::new(RefCell::new(Vec::new()));
    let lengths2 = lengths.clone();
    root.watch(&rx, "tags.length", move |_, new, _| {
        lengths2.borrow_mut().push(number(new));
        Ok(())
    }, WatchOptions::default()).unwrap();

    user.set(&rx, "name", Value::from("bob"));
    tags.push(&rx, Value::from("c"));
    rx.flush().unwrap();
    assert_eq!(*names.borrow(), vec!["bob".to_owned()]);
    assert_eq!(*lengths.borrow(), vec![3.0]);
}

#[test]
fn test_invalid_path_warns() {
    let (rx, warnings) = recording_reactor();
    let root = Instance::new(None, "Root");
    let unwatch = root.watch(&rx, "a[0]", |_, _, _| Ok(()), WatchOptions::default()).unwrap();
    assert!(unwatch.watcher().value().is_undefined());
    assert_eq!(warnings.borrow().len(), 1);
    assert!(warnings.borrow()[0].contains("a[0]"));
}

#[test]
fn test_immediate_watch() {
    let rx = Reactor::new();
    let root = Instance::new(None, "Root");
    root.init_data(&rx, [("count", 1)].into_iter().collect());

    let calls = Rc::new(RefCell::new(Vec::new()));
    let calls2 = calls.clone();
    root.watch(&rx, "count", move |_, new, old| {
        calls2.borrow_mut().push((new.clone(), old.clone()));
        Ok(())
    }, WatchOptions::default().with_immediate(true)).unwrap();
    assert_eq!(*calls.borrow(), vec![(Value::from(1), Value::Undefined)]);
    assert!(rx.current_target().is_none());
}

#[test]
fn test_computed_property() {
    let (rx, warnings) = recording_reactor();
    let root = Instance::new(None, "Root");
    root.init_data(&rx, [("n", 2)].into_iter().collect());

    let runs = Rc::new(Cell::new(0));
    let runs2 = runs.clone();
    root.init_computed(&rx, "double", move |rx, vm| {
        runs2.set(runs2.get() + 1);
        Ok(Value::from(number(&vm.get(rx, "n")) * 2.0))
    }).unwrap();
    root.init_computed_with_setter(&rx, "half", |rx, vm| Ok(Value::from(number(&vm.get(rx, "n")) / 2.0)), |rx, vm, value| {
        vm.set(rx, "n", Value::from(number(&value) * 2.0));
        Ok(())
    }).unwrap();

    assert_eq!(root.get(&rx, "double"), Value::from(4));
    assert_eq!(root.get(&rx, "double"), Value::from(4));
    assert_eq!(runs.get(), 1);

    root.set(&rx, "half", Value::from(5));
    assert_eq!(root.get(&rx, "n"), Value::from(10));
    assert_eq!(root.get(&rx, "double"), Value::from(20));
    assert_eq!(runs.get(), 2);

    root.set(&rx, "double", Value::from(1));
    assert_eq!(warnings.borrow().len(), 1);
    assert!(warnings.borrow()[0].contains("no setter"));

    root.init_computed(&rx, "n", |_, _| Ok(Value::Null)).unwrap();
    assert_eq!(warnings.borrow().len(), 2);
    assert!(warnings.borrow()[1].contains("already defined in data"));
    assert_eq!(root.get(&rx, "n"), Value::from(10));
}

#[test]
fn test_props() {
    let (rx, warnings) = recording_reactor();
    let root = Instance::new(None, "Root");
    let child = Instance::new(Some(&root), "Child");
    let options: Object = [("dense", true)].into_iter().collect();
    child.init_props(&rx, [("title", Value::from("x")), ("options", Value::from(options.clone()))]);
    assert_eq!(child.get(&rx, "title"), Value::from("x"));
    // Owned by the parent, so not observed here.
    assert!(options.observer().is_none());

    let titles = Rc::new(RefCell::new(Vec::new()));
    let titles2 = titles.clone();
    child.watch(&rx, "title", move |_, new, _| {
        titles2.borrow_mut().push(new.clone());
        Ok(())
    }, WatchOptions::default()).unwrap();

    child.update_props(&rx, [("title", Value::from("y"))]);
    assert!(warnings.borrow().is_empty());
    rx.flush().unwrap();
    assert_eq!(*titles.borrow(), vec![Value::from("y")]);

    child.set(&rx, "title", Value::from("z"));
    assert_eq!(warnings.borrow().len(), 1);
    assert!(warnings.borrow()[0].contains("Avoid mutating a prop"));
    assert_eq!(child.get(&rx, "title"), Value::from("z"));
}

#[test]
fn test_data_clashes() {
    let (rx, warnings) = recording_reactor();
    let root = Instance::new(None, "Root");
    root.init_props(&rx, [("title", "x")]);
    root.init_data(&rx, [("title", 1), ("_private", 2), ("ok", 3)].into_iter().collect());

    assert_eq!(warnings.borrow().len(), 2);
    assert_eq!(root.get(&rx, "title"), Value::from("x"));
    assert!(!root.has("_private"));
    assert_eq!(root.data().unwrap().peek("_private"), Value::from(2));
    assert_eq!(root.keys(), vec!["ok".to_owned(), "title".to_owned()]);

    root.get(&rx, "missing");
    assert_eq!(warnings.borrow().len(), 3);
}

#[test]
fn test_root_data_rejects_new_keys() {
    let (rx, warnings) = recording_reactor();
    let root = Instance::new(None, "Root");
    let data: Object = [("a", 1)].into_iter().collect();
    root.init_data(&rx, data.clone());
    assert_eq!(data.observer().unwrap().vm_count(), 1);

    data.set(&rx, "b", Value::from(2));
    assert!(!data.has("b"));
    assert!(!data.delete(&rx, "a"));
    assert_eq!(warnings.borrow().len(), 2);

    root.destroy();
    assert_eq!(data.observer().unwrap().vm_count(), 0);
}

#[test]
fn test_destroy() {
    let rx = Reactor::new();
    let root = Instance::new(None, "Root");
    root.init_data(&rx, [("a", 1)].into_iter().collect());
    root.init_computed(&rx, "b", |rx, vm| Ok(vm.get(rx, "a"))).unwrap();

    let calls = Rc::new(Cell::new(0));
    let calls2 = calls.clone();
    root.watch(&rx, "a", move |_, _, _| {
        calls2.set(calls2.get() + 1);
        Ok(())
    }, WatchOptions::default()).unwrap();
    assert_eq!(root.watchers().len(), 2);

    root.destroy();
    assert!(root.is_destroyed());
    assert!(root.watchers().is_empty());
    root.set(&rx, "a", Value::from(2));
    rx.flush().unwrap();
    assert_eq!(calls.get(), 0);
    root.destroy();
}

#[test]
fn test_user_watch_errors_are_reported() {
    let errors = Rc::new(RefCell::new(Vec::new()));
    let errors2 = errors.clone();
    let rx = Reactor::with_config(Config::default().with_error_handler(move |err, owner, label| {
        errors2.borrow_mut().push((owner.map(|vm| vm.name().to_owned()), label.to_owned(), err.to_string()));
    }));
    let root = Instance::new(None, "Root");
    root.init_data(&rx, [("a", 1)].into_iter().collect());
    root.watch(&rx, "a", |_, _, _| Err(anyhow::anyhow!("bad callback")), WatchOptions::default().with_immediate(true)).unwrap();

    assert_eq!(*errors.borrow(), vec![(
        Some("Root".to_owned()),
        "callback for immediate watcher \"a\"".to_owned(),
        "bad callback".to_owned(),
    )]);
}

#[test]
fn test_production_is_silent() {
    let warned = Rc::new(Cell::new(false));
    let warned2 = warned.clone();
    let rx = Reactor::with_config(Config::default().with_production(true).with_warn_handler(move |_, _| warned2.set(true)));
    let root = Instance::new(None, "Root");
    let child = Instance::new(Some(&root), "Child");
    child.init_props(&rx, [("title", "x")]);
    child.set(&rx, "title", Value::from("y"));
    child.get(&rx, "missing");
    assert!(!warned.get());
    assert_eq!(child.get(&rx, "title"), Value::from("y"));
}

#[test]
fn test_owner_tree() {
    let root = Instance::new(None, "Root");
    let mid = Instance::new(Some(&root), "Mid");
    let leaf = Instance::new(Some(&mid), "Leaf");
    assert!(root.is_root());
    assert!(!leaf.is_root());
    assert_eq!(leaf.parent(), Some(&mid));
    assert_eq!(leaf.root(), root);
}
