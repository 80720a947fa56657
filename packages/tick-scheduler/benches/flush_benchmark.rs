use criterion::{Criterion, black_box, criterion_group, criterion_main};
use tick_host::{CapabilitySet, EventLoop};
use tick_scheduler::Scheduler;

fn benchmark_high_tier(c: &mut Criterion) {
    c.bench_function("register_callback 1000 (microtask)", |b| {
        b.iter(|| {
            let host = EventLoop::new(CapabilitySet::browser());
            let scheduler = Scheduler::new(&host);
            for _ in 0..1000 {
                scheduler.register_callback(
                    |_| {
                        black_box(1 + 1);
                    },
                    None,
                );
            }
            host.run_until_idle();
        })
    });
}

fn benchmark_low_tier(c: &mut Criterion) {
    c.bench_function("register_callback 1000 (message channel)", |b| {
        b.iter(|| {
            let host = EventLoop::new(CapabilitySet::browser());
            let scheduler = Scheduler::new(&host);
            scheduler.run_low_priority(|| {
                for _ in 0..1000 {
                    scheduler.register_callback(
                        |_| {
                            black_box(1 + 1);
                        },
                        None,
                    );
                }
            });
            host.run_until_idle();
        })
    });
}

criterion_group!(benches, benchmark_high_tier, benchmark_low_tier);
criterion_main!(benches);
