//! Benchmarks for the dependency hot paths.
//!
//! - notify over many subscribers, async vs sync (sorted) dispatch
//! - remove_subscriber on a large list (tombstone) followed by flush
//! - depend() under a tracking context
//!
//! Run with: cargo bench -p depwire --bench notify_bench

use std::hint::black_box;
use std::rc::{Rc, Weak};

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use depwire::config::override_config;
use depwire::{BoxError, DepConfig, Dependency, Subscriber, SubscriberId, cleanup, context};

struct Noop {
    id: SubscriberId,
    this: Weak<Noop>,
}

impl Subscriber for Noop {
    fn id(&self) -> SubscriberId {
        self.id
    }

    fn register_dependency(&self, dep: &Dependency) {
        if let Some(this) = self.this.upgrade() {
            dep.register_subscriber(&(this as Rc<dyn Subscriber>));
        }
    }

    fn update(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

fn subscribers(count: u64) -> Vec<Rc<dyn Subscriber>> {
    // Reverse ids so sync dispatch has real sorting work.
    (0..count)
        .rev()
        .map(|raw| {
            Rc::new_cyclic(|this| Noop {
                id: SubscriberId::new(raw),
                this: this.clone(),
            }) as Rc<dyn Subscriber>
        })
        .collect()
}

// =============================================================================
// notify
// =============================================================================

fn bench_notify(c: &mut Criterion) {
    let mut group = c.benchmark_group("dep/notify");

    for &count in &[10u64, 100, 1_000] {
        let subs = subscribers(count);
        let dep = Dependency::new();
        for sub in &subs {
            dep.register_subscriber(sub);
        }

        group.bench_with_input(BenchmarkId::new("async", count), &dep, |b, dep| {
            let _cfg = override_config(DepConfig::default().with_async_mode(true));
            b.iter(|| black_box(dep.notify()))
        });

        group.bench_with_input(BenchmarkId::new("sync_sorted", count), &dep, |b, dep| {
            let _cfg = override_config(DepConfig::synchronous());
            b.iter(|| black_box(dep.notify()))
        });
    }

    group.finish();
}

// =============================================================================
// remove + flush
// =============================================================================

fn bench_remove_and_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("dep/remove");

    for &count in &[100u64, 10_000] {
        let subs = subscribers(count);

        group.bench_with_input(
            BenchmarkId::new("tombstone_half_then_flush", count),
            &subs,
            |b, subs| {
                b.iter(|| {
                    let dep = Dependency::new();
                    for sub in subs {
                        dep.register_subscriber(sub);
                    }
                    for sub in subs.iter().step_by(2) {
                        dep.remove_subscriber(sub);
                    }
                    black_box(cleanup::flush())
                })
            },
        );
    }

    group.finish();
}

// =============================================================================
// depend
// =============================================================================

fn bench_depend(c: &mut Criterion) {
    let mut group = c.benchmark_group("dep/depend");
    let dep = Dependency::new();

    group.bench_function("untracked", |b| b.iter(|| dep.depend()));

    let target = subscribers(1).remove(0);
    group.bench_function("tracked_then_flush", |b| {
        b.iter(|| {
            context::track(Some(Rc::clone(&target)), || dep.depend());
            dep.remove_subscriber(&target);
            black_box(cleanup::flush())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_notify, bench_remove_and_flush, bench_depend);
criterion_main!(benches);
