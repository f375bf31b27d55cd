#![forbid(unsafe_code)]

//! End-to-end scenarios for the tracking core: an evaluation driver, a few
//! observable slots, and subscribers wired together through the public API.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use depwire::config::override_config;
use depwire::context;
use depwire::{
    BoxError, Computed, DepConfig, Dependency, Effect, Subscriber, SubscriberContext,
    SubscriberId, cleanup,
};

/// Subscriber that logs its id on update and registers itself on depend.
struct Recorder {
    id: SubscriberId,
    this: Weak<Recorder>,
    log: Rc<RefCell<Vec<u64>>>,
}

impl Recorder {
    fn new(raw: u64, log: &Rc<RefCell<Vec<u64>>>) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            id: SubscriberId::new(raw),
            this: this.clone(),
            log: Rc::clone(log),
        })
    }
}

fn handle(recorder: &Rc<Recorder>) -> Rc<dyn Subscriber> {
    Rc::clone(recorder) as Rc<dyn Subscriber>
}

impl Subscriber for Recorder {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn register_dependency(&self, dep: &Dependency) {
        if let Some(this) = self.this.upgrade() {
            dep.register_subscriber(&handle(&this));
        }
    }

    fn update(&self) -> Result<(), BoxError> {
        self.log.borrow_mut().push(self.id.raw());
        Ok(())
    }
}

/// Observable integer slot, standing in for the instrumentation layer.
struct Slot {
    value: Cell<i64>,
    dep: Dependency,
}

impl Slot {
    fn new(value: i64) -> Rc<Self> {
        Rc::new(Self {
            value: Cell::new(value),
            dep: Dependency::new(),
        })
    }

    fn get(&self) -> i64 {
        self.dep.depend();
        self.value.get()
    }

    fn set(&self, value: i64) {
        self.value.set(value);
        self.dep.notify().expect("subscribers never fail here");
    }
}

#[test]
fn sync_dispatch_orders_by_id_then_skips_removed() {
    depwire::reset();
    let _cfg = override_config(DepConfig::synchronous());
    let log = Rc::new(RefCell::new(Vec::new()));
    let d = Dependency::new();
    let subs: Vec<_> = [3, 1, 2].iter().map(|&id| Recorder::new(id, &log)).collect();
    for sub in &subs {
        d.register_subscriber(&handle(&sub));
    }

    d.notify().expect("notify");
    assert_eq!(*log.borrow(), vec![1, 2, 3]);

    log.borrow_mut().clear();
    d.remove_subscriber(&handle(&subs[1]));
    d.notify().expect("notify");
    assert_eq!(*log.borrow(), vec![2, 3]);
}

#[test]
fn sequential_evaluations_register_in_order() {
    depwire::reset();
    let log = Rc::new(RefCell::new(Vec::new()));
    let d = Dependency::new();
    let x = Recorder::new(1, &log);
    let y = Recorder::new(2, &log);

    context::push_target(Some(handle(&x)));
    d.depend();
    context::pop_target();
    context::push_target(Some(handle(&y)));
    d.depend();
    context::pop_target();

    assert_eq!(
        d.subscriber_ids(),
        vec![SubscriberId::new(1), SubscriberId::new(2)]
    );
    assert_eq!(context::depth(), 0);
}

#[test]
fn explicit_context_object_nests() {
    let log = Rc::new(RefCell::new(Vec::new()));
    let ctx = SubscriberContext::new();
    let a = Recorder::new(1, &log);
    let b = Recorder::new(2, &log);

    ctx.push(Some(handle(&a)));
    ctx.push(Some(handle(&b)));
    ctx.pop();
    assert_eq!(ctx.current_id(), Some(SubscriberId::new(1)));
}

#[test]
fn depend_outside_evaluation_is_inert() {
    depwire::reset();
    let d = Dependency::new();
    d.depend();
    assert_eq!(d.raw_len(), 0);
    assert!(!d.is_cleanup_pending());
}

#[test]
fn effect_reading_computed_tracks_through_chain() {
    depwire::reset();
    let price = Slot::new(10);
    let qty = Slot::new(3);
    let (p, q) = (Rc::clone(&price), Rc::clone(&qty));
    let total = Computed::new(move || p.get() * q.get());

    let rendered = Rc::new(RefCell::new(Vec::new()));
    let (t, out) = (total.clone(), Rc::clone(&rendered));
    let effect = Effect::new(move || out.borrow_mut().push(format!("total={}", t.get())));

    price.set(12);
    qty.set(4);
    assert_eq!(
        *rendered.borrow(),
        vec!["total=30", "total=36", "total=48"]
    );
    assert_eq!(total.dependency().subscriber_ids(), vec![effect.id()]);
    assert_eq!(context::depth(), 0);
}

#[test]
fn branch_switch_then_flush_compacts_abandoned_slot() {
    depwire::reset();
    let use_left = Slot::new(1);
    let left = Slot::new(10);
    let right = Slot::new(20);
    let (u, l, r) = (Rc::clone(&use_left), Rc::clone(&left), Rc::clone(&right));
    let runs = Rc::new(Cell::new(0));
    let counter = Rc::clone(&runs);
    let _effect = Effect::new(move || {
        counter.set(counter.get() + 1);
        let _ = if u.get() != 0 { l.get() } else { r.get() };
    });

    use_left.set(0);
    assert_eq!(runs.get(), 2);
    assert_eq!(left.dep.raw_len(), 1);
    assert!(left.dep.is_empty());
    assert_eq!(cleanup::pending_len(), 1);

    left.set(11);
    assert_eq!(runs.get(), 2);

    let stats = cleanup::flush();
    assert_eq!(stats.dependencies, 1);
    assert_eq!(stats.removed, 1);
    assert_eq!(left.dep.raw_len(), 0);
    assert_eq!(right.dep.len(), 1);

    right.set(21);
    assert_eq!(runs.get(), 3);
}

#[test]
fn failing_subscriber_does_not_block_later_ones() {
    depwire::reset();
    let _cfg = override_config(DepConfig::synchronous());
    let d = Dependency::new();
    let log = Rc::new(RefCell::new(Vec::new()));
    let before = Recorder::new(1, &log);
    let after = Recorder::new(3, &log);
    d.register_subscriber(&handle(&before));
    d.register_subscriber(&handle(&after));

    let (dep, first) = (d.clone(), Rc::new(Cell::new(true)));
    let flag = Rc::clone(&first);
    let failing = Effect::try_new(move || {
        dep.depend();
        if flag.replace(false) {
            Ok(())
        } else {
            Err("refused".into())
        }
    })
    .expect("first run succeeds");

    let err = d.notify().expect_err("one failure");
    assert_eq!(err.subscriber_ids(), vec![failing.id()]);
    assert_eq!(*log.borrow(), vec![1, 3]);
}

#[cfg(feature = "tracing")]
mod tracing_events {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tracing::Subscriber as TracingSubscriber;
    use tracing_subscriber::Layer;
    use tracing_subscriber::layer::{Context, SubscriberExt};

    struct MessageCapture {
        messages: Arc<Mutex<Vec<String>>>,
    }

    impl<S> Layer<S> for MessageCapture
    where
        S: TracingSubscriber + for<'lookup> tracing_subscriber::registry::LookupSpan<'lookup>,
    {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            struct Msg {
                message: Option<String>,
            }
            impl tracing::field::Visit for Msg {
                fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                    if field.name() == "message" {
                        self.message = Some(value.to_string());
                    }
                }

                fn record_debug(
                    &mut self,
                    field: &tracing::field::Field,
                    value: &dyn std::fmt::Debug,
                ) {
                    if field.name() == "message" {
                        self.message = Some(format!("{value:?}").trim_matches('"').to_string());
                    }
                }
            }
            let mut msg = Msg { message: None };
            event.record(&mut msg);
            if let Some(message) = msg.message {
                self.messages.lock().expect("capture lock").push(message);
            }
        }
    }

    #[test]
    fn remove_missing_and_flush_are_logged() {
        depwire::reset();
        let messages = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(MessageCapture {
            messages: Arc::clone(&messages),
        });
        let _guard = tracing::subscriber::set_default(subscriber);

        let log = Rc::new(RefCell::new(Vec::new()));
        let d = Dependency::new();
        let present = Recorder::new(1, &log);
        let stranger = Recorder::new(2, &log);
        d.register_subscriber(&handle(&present));

        assert!(!d.remove_subscriber(&handle(&stranger)));
        assert!(d.remove_subscriber(&handle(&present)));
        d.notify().expect("notify");
        cleanup::flush();

        let messages = messages.lock().expect("capture lock");
        assert!(messages.iter().any(|m| m == "dep.remove.missing"));
        assert!(messages.iter().any(|m| m == "dep.notify"));
        assert!(messages.iter().any(|m| m == "dep.cleanup.flush"));
    }
}
