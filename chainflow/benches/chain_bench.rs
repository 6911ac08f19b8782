//! Benchmarks for chain execution.

use chainflow::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::Value;
use std::sync::Arc;

fn inc() -> LinkRef {
    link_fn("inc", |mut ctx| {
        let n = ctx.get_i64("n").unwrap_or(0);
        ctx.set("n", n + 1);
        Ok(ctx)
    })
}

fn chain_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");

    let plain = chain((0..10).map(|_| inc()));
    c.bench_function("chain_10_links", |b| {
        b.iter(|| runtime.block_on(plain.invoke(black_box(Context::new().with("n", 0)))));
    });

    let observed = chain((0..10).map(|_| inc()));
    observed.using(Arc::new(TimingMiddleware::default()));
    c.bench_function("chain_10_links_timing", |b| {
        b.iter(|| runtime.block_on(observed.invoke(black_box(Context::new().with("n", 0)))));
    });

    let engine = Engine::new();
    engine.register_component("inc", |_: &Value| inc());
    let mut descriptor = PipelineDescriptor::new("bench");
    for _ in 0..10 {
        descriptor = descriptor.component("inc", Value::Null);
    }
    engine.configure_pipeline("bench", descriptor).expect("configure");
    c.bench_function("registry_execute_cached", |b| {
        b.iter(|| {
            runtime
                .block_on(engine.execute("bench", black_box(Context::new().with("n", 0))))
                .expect("execute")
        });
    });
}

criterion_group!(benches, chain_benchmark);
criterion_main!(benches);
