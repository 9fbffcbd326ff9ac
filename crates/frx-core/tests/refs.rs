#![forbid(unsafe_code)]

//! Boxed references: plain cells, refs nested inside observed containers and
//! property refs produced by `to_refs`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use frx_core::{Runtime, Value, array, is_ref, object, unref};

fn number(value: &Value) -> f64 {
    value.as_f64().unwrap_or(f64::NAN)
}

#[test]
fn holds_a_value() {
    let rt = Runtime::new();
    let a = rt.create_ref(1);
    assert_eq!(a.get(), Value::from(1));
    a.set(2);
    assert_eq!(a.get(), Value::from(2));
}

#[test]
fn is_reactive() {
    let rt = Runtime::new();
    let a = rt.create_ref(1);
    let dummy = Rc::new(Cell::new(0.0));
    let calls = Rc::new(Cell::new(0));
    let (seen, count, reader) = (Rc::clone(&dummy), Rc::clone(&calls), a.clone());
    rt.effect(move || {
        count.set(count.get() + 1);
        seen.set(number(&reader.get()));
    });

    assert_eq!(calls.get(), 1);
    assert_eq!(dummy.get(), 1.0);
    a.set(2);
    assert_eq!(calls.get(), 2);
    assert_eq!(dummy.get(), 2.0);
    // same value should not trigger
    a.set(2);
    assert_eq!(calls.get(), 2);
}

#[test]
fn makes_nested_properties_reactive() {
    let rt = Runtime::new();
    let a = rt.create_ref(object! { "count" => 1 });
    let dummy = Rc::new(Cell::new(0.0));
    let (seen, reader) = (Rc::clone(&dummy), a.clone());
    rt.effect(move || seen.set(number(&reader.get().get("count"))));

    assert_eq!(dummy.get(), 1.0);
    a.get().set("count", 2);
    assert_eq!(dummy.get(), 2.0);
}

#[test]
fn works_like_a_normal_property_when_nested_in_an_observed_object() {
    let rt = Runtime::new();
    let a = rt.create_ref(1);
    let obj = rt.observe(object! {
        "a" => a.clone(),
        "b" => object! {
            "c" => a.clone(),
            "d" => array![a.clone()],
        },
    });

    let dummies = Rc::new(RefCell::new((0.0, 0.0, 0.0)));
    let (seen, reader) = (Rc::clone(&dummies), obj.clone());
    rt.effect(move || {
        *seen.borrow_mut() = (
            number(&reader.get("a")),
            number(&reader.get("b").get("c")),
            number(&reader.get("b").get("d").get(0)),
        );
    });
    assert_eq!(*dummies.borrow(), (1.0, 1.0, 1.0));

    a.update(|v| Value::from(number(&v) + 1.0));
    assert_eq!(*dummies.borrow(), (2.0, 2.0, 2.0));

    // writing a plain value into a slot holding a ref writes through the ref
    obj.set("a", number(&obj.get("a")) + 1.0);
    assert_eq!(*dummies.borrow(), (3.0, 3.0, 3.0));
    assert_eq!(a.get(), Value::from(3));
    assert!(is_ref(&rt.unwrap(&obj).get("a")));
}

#[test]
fn replacing_a_ref_slot_with_a_ref_swaps_it() {
    let rt = Runtime::new();
    let a = rt.create_ref(1);
    let b = rt.create_ref(2);
    let obj = rt.observe(object! { "r" => a.clone() });

    obj.set("r", b.clone());
    assert_eq!(obj.get("r"), Value::from(2));
    assert_eq!(a.get(), Value::from(1));
}

#[test]
fn unwraps_nested_refs() {
    let rt = Runtime::new();
    let a = rt.create_ref(0);
    let b = rt.create_ref(a.clone());
    assert_eq!(b.get(), Value::from(0));

    let dummy = Rc::new(Cell::new(-1.0));
    let (seen, reader) = (Rc::clone(&dummy), b.clone());
    rt.effect(move || seen.set(number(&reader.get())));
    assert_eq!(dummy.get(), 0.0);

    a.set(1);
    assert_eq!(dummy.get(), 1.0);
    assert_eq!(b.get(), Value::from(1));
}

#[test]
fn array_mutators_see_boxed_refs() {
    let rt = Runtime::new();
    let a = rt.create_ref(1);
    let list = rt.try_reactive(array![a.clone()]).expect("array");

    assert_eq!(list.get(0), Value::from(1));
    let popped = list.pop().expect("array");
    assert!(is_ref(&popped));
    assert_eq!(unref(&popped), Value::from(1));
}

#[test]
fn is_ref_recognizes_every_flavor() {
    let rt = Runtime::new();
    assert!(is_ref(&Value::from(rt.create_ref(0))));
    assert!(is_ref(&Value::from(rt.computed(|| 1))));

    let refs = rt
        .to_refs(&rt.observe(object! { "x" => 1 }))
        .expect("object");
    let x = refs.get("x").expect("x ref").clone();
    assert!(is_ref(&Value::from(x)));

    assert!(!is_ref(&Value::from(0)));
    assert!(!is_ref(&Value::from(1)));
    // an object that looks like a ref is not one
    assert!(!is_ref(&Value::from(object! { "value" => 0 })));
}

#[test]
fn unref_passes_non_refs_through() {
    let rt = Runtime::new();
    assert_eq!(unref(&Value::from(rt.create_ref(1))), Value::from(1));
    assert_eq!(unref(&Value::from("plain")), Value::from("plain"));
}

#[test]
fn to_refs() {
    let rt = Runtime::new();
    let a = rt.observe(object! { "x" => 1, "y" => 2 });
    let refs = rt.to_refs(&a).expect("object");
    let x = refs.get("x").expect("x ref").clone();
    let y = refs.get("y").expect("y ref").clone();

    // check refs
    assert_eq!(x.get(), Value::from(1));
    assert_eq!(y.get(), Value::from(2));

    // source -> proxy
    a.set("x", 2);
    a.set("y", 3);
    assert_eq!(x.get(), Value::from(2));
    assert_eq!(y.get(), Value::from(3));

    // proxy -> source
    x.set(3);
    y.set(4);
    assert_eq!(a.get("x"), Value::from(3));
    assert_eq!(a.get("y"), Value::from(4));

    // reactivity
    let dummies = Rc::new(Cell::new((0.0, 0.0)));
    let (seen, rx, ry) = (Rc::clone(&dummies), x.clone(), y.clone());
    rt.effect(move || seen.set((number(&rx.get()), number(&ry.get()))));
    assert_eq!(dummies.get(), (3.0, 4.0));

    // mutating source should trigger effect using the proxy refs
    a.set("x", 4);
    a.set("y", 5);
    assert_eq!(dummies.get(), (4.0, 5.0));

    // mutating the refs writes the source and triggers too
    x.set(5);
    y.set(6);
    assert_eq!(dummies.get(), (5.0, 6.0));
    assert_eq!(a.get("x"), Value::from(5));
}

#[test]
fn to_refs_keeps_key_order() {
    let rt = Runtime::new();
    let refs = rt
        .to_refs(&rt.observe(object! { "b" => 1, "a" => 2 }))
        .expect("object");
    let keys: Vec<String> = refs.iter().map(|(k, _)| k.to_string()).collect();
    assert_eq!(keys, ["b", "a"]);
}

#[test]
fn ref_writes_compare_raw_forms() {
    let rt = Runtime::new();
    let raw = object! { "n" => 1 };
    let r = rt.create_ref(raw.clone());
    let calls = Rc::new(Cell::new(0));
    let (count, reader) = (Rc::clone(&calls), r.clone());
    rt.effect(move || {
        let _ = reader.get();
        count.set(count.get() + 1);
    });

    // the wrapper and its raw object are the same value
    r.set(rt.observe(raw.clone()));
    r.set(raw);
    assert_eq!(calls.get(), 1);

    r.set(object! {});
    assert_eq!(calls.get(), 2);
}
