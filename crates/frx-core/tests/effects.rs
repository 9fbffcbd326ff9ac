#![forbid(unsafe_code)]

//! Effect scheduling: rerun counts, dependency cleanup, stop, schedulers,
//! nesting, computed ordering and the trigger depth limit.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use frx_core::{
    CollectingSink, Effect, EffectOptions, Runtime, RuntimeConfig, Severity, Value, array, object,
};

fn counter() -> Rc<Cell<u32>> {
    Rc::new(Cell::new(0))
}

fn bump(count: &Cell<u32>) {
    count.set(count.get() + 1);
}

fn number(value: &Value) -> f64 {
    value.as_f64().unwrap_or(f64::NAN)
}

#[test]
fn runs_the_function_once_on_creation() {
    let rt = Runtime::new();
    let calls = counter();
    let seen = Rc::clone(&calls);
    rt.effect(move || bump(&seen));
    assert_eq!(calls.get(), 1);
}

#[test]
fn reruns_exactly_once_per_mutation() {
    let rt = Runtime::new();
    let state = rt.observe(object! { "num" => 0 });
    let calls = counter();
    let (seen, reader) = (Rc::clone(&calls), state.clone());
    rt.effect(move || {
        // read the same key several ways
        let _ = reader.get("num");
        let _ = reader.get("num");
        let _ = reader.as_reactive().map(|r| r.has("num"));
        bump(&seen);
    });

    state.set("num", 1);
    assert_eq!(calls.get(), 2);
    state.set("num", 2);
    assert_eq!(calls.get(), 3);
}

#[test]
fn observes_multiple_properties() {
    let rt = Runtime::new();
    let counter_obj = rt.observe(object! { "num1" => 0, "num2" => 0 });
    let dummy = Rc::new(Cell::new(0.0));
    let (seen, reader) = (Rc::clone(&dummy), counter_obj.clone());
    rt.effect(move || {
        let a = number(&reader.get("num1"));
        let b = number(&reader.get("num2"));
        seen.set(a + a + b);
    });

    assert_eq!(dummy.get(), 0.0);
    counter_obj.set("num1", 7);
    counter_obj.set("num2", 7);
    assert_eq!(dummy.get(), 21.0);
}

#[test]
fn observes_iteration() {
    let rt = Runtime::new();
    let list = rt.try_reactive(array!["Hello"]).expect("array");
    let dummy = Rc::new(RefCell::new(String::new()));
    let (seen, reader) = (Rc::clone(&dummy), list.clone());
    rt.effect(move || {
        let joined: Vec<String> = reader.values().iter().map(ToString::to_string).collect();
        *seen.borrow_mut() = joined.join(" ");
    });

    assert_eq!(*dummy.borrow(), "Hello");
    list.push("World!").expect("array");
    assert_eq!(*dummy.borrow(), "Hello World!");
    list.remove(0).expect("array");
    assert_eq!(*dummy.borrow(), "World!");
}

#[test]
fn observes_added_and_deleted_keys() {
    let rt = Runtime::new();
    let obj = rt.try_reactive(object! {}).expect("object");
    let keys = Rc::new(Cell::new(0usize));
    let (seen, reader) = (Rc::clone(&keys), obj.clone());
    rt.effect(move || seen.set(reader.keys().len()));

    obj.set("a", 1);
    assert_eq!(keys.get(), 1);
    obj.set("a", 2);
    assert_eq!(keys.get(), 1);
    obj.delete("a");
    assert_eq!(keys.get(), 0);
}

#[test]
fn cleans_up_dependencies_of_branches_not_taken() {
    let rt = Runtime::new();
    let obj = rt.observe(object! { "prop" => "value", "run" => true });
    let calls = counter();
    let dummy = Rc::new(RefCell::new(String::new()));
    let (count, seen, reader) = (Rc::clone(&calls), Rc::clone(&dummy), obj.clone());
    let effect = rt.effect(move || {
        bump(&count);
        *seen.borrow_mut() = if reader.get("run").as_bool() == Some(true) {
            reader.get("prop").to_string()
        } else {
            "other".to_string()
        };
    });

    assert_eq!(*dummy.borrow(), "value");
    assert_eq!(effect.dep_count(), 2);
    obj.set("run", false);
    assert_eq!(calls.get(), 2);
    assert_eq!(*dummy.borrow(), "other");
    assert_eq!(effect.dep_count(), 1);

    obj.set("prop", "value2");
    assert_eq!(calls.get(), 2);
    assert_eq!(*dummy.borrow(), "other");
}

#[test]
fn does_not_loop_on_its_own_writes() {
    let rt = Runtime::new();
    let count = rt.create_ref(0);
    let calls = counter();
    let (seen, rw) = (Rc::clone(&calls), count.clone());
    rt.effect(move || {
        bump(&seen);
        rw.set(number(&rw.get()) + 1.0);
    });

    assert_eq!(count.get(), Value::from(1));
    assert_eq!(calls.get(), 1);

    count.set(5);
    assert_eq!(count.get(), Value::from(6));
    assert_eq!(calls.get(), 2);
}

#[test]
fn lazy_effects_wait_for_run() {
    let rt = Runtime::new();
    let obj = rt.observe(object! { "foo" => 1 });
    let calls = counter();
    let (seen, reader) = (Rc::clone(&calls), obj.clone());
    let effect = rt.create_effect(
        move || {
            bump(&seen);
            reader.get("foo")
        },
        EffectOptions::new().with_lazy(true),
    );

    assert_eq!(calls.get(), 0);
    obj.set("foo", 2);
    assert_eq!(calls.get(), 0);

    assert_eq!(effect.run(), Value::from(2));
    assert_eq!(calls.get(), 1);
    obj.set("foo", 3);
    assert_eq!(calls.get(), 2);
}

#[test]
fn scheduler_replaces_synchronous_reruns() {
    let rt = Runtime::new();
    let obj = rt.observe(object! { "foo" => 1 });
    let dummy = Rc::new(Cell::new(0.0));
    let queue: Rc<RefCell<Vec<Effect>>> = Rc::new(RefCell::new(Vec::new()));
    let (seen, reader, jobs) = (Rc::clone(&dummy), obj.clone(), Rc::clone(&queue));
    rt.create_effect(
        move || seen.set(number(&reader.get("foo"))),
        EffectOptions::new().with_scheduler(move |job| jobs.borrow_mut().push(job.clone())),
    );

    assert_eq!(dummy.get(), 1.0);
    obj.set("foo", 2);
    obj.set("foo", 3);
    assert_eq!(dummy.get(), 1.0);
    assert_eq!(queue.borrow().len(), 2);

    let pending: Vec<Effect> = queue.borrow_mut().drain(..).collect();
    for job in pending {
        job.run();
    }
    assert_eq!(dummy.get(), 3.0);
}

#[test]
fn stop() {
    let rt = Runtime::new();
    let obj = rt.observe(object! { "prop" => 1 });
    let dummy = Rc::new(Cell::new(0.0));
    let (seen, reader) = (Rc::clone(&dummy), obj.clone());
    let runner = rt.effect(move || seen.set(number(&reader.get("prop"))));

    obj.set("prop", 2);
    assert_eq!(dummy.get(), 2.0);
    runner.stop();
    obj.set("prop", 3);
    assert_eq!(dummy.get(), 2.0);
    assert_eq!(runner.dep_count(), 0);

    // stopped effect should still be manually callable
    runner.run();
    assert_eq!(dummy.get(), 3.0);
    obj.set("prop", 4);
    assert_eq!(dummy.get(), 3.0);
    assert_eq!(rt.stats().subscriptions, 0);
}

#[test]
fn on_stop_runs_once() {
    let rt = Runtime::new();
    let stops = counter();
    let seen = Rc::clone(&stops);
    let effect = rt.create_effect(|| (), EffectOptions::new().with_on_stop(move || bump(&seen)));

    effect.stop();
    effect.stop();
    assert_eq!(stops.get(), 1);
    assert!(!effect.is_active());
}

#[test]
fn nested_effects_track_separately() {
    let rt = Runtime::new();
    let nums = rt.observe(object! { "num1" => 0, "num2" => 1 });
    let (outer_calls, inner_calls) = (counter(), counter());

    let (seen, reader) = (Rc::clone(&inner_calls), nums.clone());
    let inner = rt.create_effect(
        move || {
            bump(&seen);
            reader.get("num2")
        },
        EffectOptions::new().with_lazy(true),
    );
    let (seen, reader) = (Rc::clone(&outer_calls), nums.clone());
    rt.effect(move || {
        bump(&seen);
        inner.run();
        reader.get("num1")
    });
    assert_eq!((outer_calls.get(), inner_calls.get()), (1, 1));

    // only the inner effect read num2
    nums.set("num2", 4);
    assert_eq!((outer_calls.get(), inner_calls.get()), (1, 2));

    // the outer effect reruns the inner one
    nums.set("num1", 2);
    assert_eq!((outer_calls.get(), inner_calls.get()), (2, 3));
}

#[test]
fn reentrant_run_returns_undefined() {
    let rt = Runtime::new();
    let handle: Rc<RefCell<Option<Effect>>> = Rc::new(RefCell::new(None));
    let nested = Rc::new(RefCell::new(Vec::new()));
    let calls = counter();
    let (slot, out, seen) = (Rc::clone(&handle), Rc::clone(&nested), Rc::clone(&calls));
    let effect = rt.create_effect(
        move || {
            bump(&seen);
            let this = slot.borrow().clone();
            if let Some(this) = this {
                out.borrow_mut().push(this.run());
            }
            42
        },
        EffectOptions::new().with_lazy(true),
    );
    *handle.borrow_mut() = Some(effect.clone());

    assert_eq!(effect.run(), Value::from(42));
    assert_eq!(calls.get(), 1);
    assert_eq!(*nested.borrow(), vec![Value::Undefined]);
    assert!(!effect.is_running());
}

#[test]
fn stopped_mid_pass_is_skipped() {
    let rt = Runtime::new();
    let x = rt.create_ref(0);
    let victim: Rc<RefCell<Option<Effect>>> = Rc::new(RefCell::new(None));
    let victim_calls = counter();

    let (reader, target) = (x.clone(), Rc::clone(&victim));
    rt.effect(move || {
        if number(&reader.get()) > 0.0
            && let Some(effect) = target.borrow().as_ref()
        {
            effect.stop();
        }
    });
    let (reader, seen) = (x.clone(), Rc::clone(&victim_calls));
    let second = rt.effect(move || {
        let _ = reader.get();
        bump(&seen);
    });
    *victim.borrow_mut() = Some(second.clone());

    x.set(1);
    assert_eq!(victim_calls.get(), 1);
    assert!(!second.is_active());
}

#[test]
fn computed_dependencies_settle_before_plain_effects() {
    let rt = Runtime::new();
    let source = rt.create_ref(1);
    let reader = source.clone();
    let doubled = rt.computed(move || number(&reader.get()) * 2.0);

    let seen_pairs = Rc::new(RefCell::new(Vec::new()));
    let (log, s, d) = (Rc::clone(&seen_pairs), source.clone(), doubled.clone());
    rt.effect(move || {
        log.borrow_mut()
            .push((number(&s.get()), number(&d.get())));
    });
    assert_eq!(*seen_pairs.borrow(), vec![(1.0, 2.0)]);

    source.set(2);
    // one rerun, and it never sees a stale computed value
    assert_eq!(*seen_pairs.borrow(), vec![(1.0, 2.0), (2.0, 4.0)]);
}

#[test]
fn trigger_depth_is_bounded() {
    let sink = CollectingSink::new();
    let rt = Runtime::with_config(RuntimeConfig::default().with_max_trigger_depth(2))
        .expect("valid config")
        .with_diagnostics(sink.clone());

    let a = rt.create_ref(0);
    let b = rt.create_ref(0);
    let c = rt.create_ref(0);
    let d = rt.create_ref(0);
    for (from, to) in [(&a, &b), (&b, &c), (&c, &d)] {
        let (from, to) = (from.clone(), to.clone());
        rt.effect(move || to.set(from.get()));
    }
    assert!(sink.is_empty());

    a.set(1);
    assert_eq!(b.get(), Value::from(1));
    assert_eq!(c.get(), Value::from(1));
    // the third hop was dropped
    assert_eq!(d.get(), Value::from(0));

    let last = sink.last().expect("depth diagnostic");
    assert_eq!(last.severity, Severity::Error);
    assert!(
        last.message
            .starts_with("maximum trigger depth 2 exceeded; dropped 1 update(s)"),
        "unexpected message: {}",
        last.message
    );
}

#[test]
fn tracking_can_be_paused() {
    let rt = Runtime::new();
    let obj = rt.observe(object! { "a" => 1, "b" => 1 });
    let calls = counter();
    let (seen, reader, ctl) = (Rc::clone(&calls), obj.clone(), rt.downgrade());
    rt.effect(move || {
        bump(&seen);
        let _ = reader.get("a");
        if let Some(rt) = ctl.upgrade() {
            rt.untracked(|| reader.get("b"));
        }
    });

    obj.set("b", 2);
    assert_eq!(calls.get(), 1);
    obj.set("a", 2);
    assert_eq!(calls.get(), 2);
    assert!(rt.is_tracking());
}

#[test]
fn dropping_the_runtime_releases_effects_holding_a_weak_handle() {
    let rt = Runtime::new();
    let obj = rt.observe(object! { "a" => 1 });
    let handle = rt.downgrade();
    let (reader, ctl) = (obj.clone(), rt.downgrade());
    rt.effect(move || {
        let _ = reader.get("a");
        let _ = ctl.upgrade().map(|rt| rt.is_tracking());
    });
    assert_eq!(rt.stats().subscriptions, 1);

    drop(rt);
    assert!(handle.upgrade().is_none());
    // the wrapper outlives the runtime and still reads raw storage
    assert_eq!(obj.get("a"), Value::from(1));
}

#[test]
fn effect_owning_the_runtime_keeps_it_alive_until_released() {
    let rt = Runtime::new();
    let obj = rt.observe(object! { "a" => 1 });
    let handle = rt.downgrade();
    let (reader, ctl) = (obj.clone(), rt.clone());
    let effect = rt.effect(move || {
        let _ = reader.get("a");
        let _ = ctl.is_tracking();
    });

    drop(rt);
    assert!(handle.upgrade().is_some());
    effect.stop();
    drop(effect);
    assert!(handle.upgrade().is_none());
}

#[test]
fn active_effect_is_visible_inside_the_run() {
    let rt = Runtime::new();
    let observed = Rc::new(Cell::new(false));
    let (seen, ctl) = (Rc::clone(&observed), rt.clone());
    let effect = rt.create_effect(
        move || seen.set(ctl.active_effect().is_some()),
        EffectOptions::new().with_lazy(true),
    );

    assert!(rt.active_effect().is_none());
    effect.run();
    assert!(observed.get());
    assert!(rt.active_effect().is_none());
}
