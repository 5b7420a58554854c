use std::sync::OnceLock;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use react_bench::{engine::Engine, fixtures, js::V8Engine};

/// React 0.13 loaded once; every bench works on clones of it.
fn react_013() -> &'static V8Engine {
    static ENGINE: OnceLock<V8Engine> = OnceLock::new();
    ENGINE.get_or_init(|| {
        let mut engine = V8Engine::new();
        if let Err(e) = engine.load(&fixtures::react_0133_source()) {
            panic!("loading React 0.13: {e}");
        }
        engine
    })
}

fn load_bench(c: &mut Criterion) {
    let src = fixtures::react_0133_source();
    c.bench_function("load react 0.13", |b| {
        b.iter_with_large_drop(|| {
            let mut e = V8Engine::new();
            if let Err(err) = e.load(black_box(&src)) {
                panic!("loading React 0.13: {err}");
            }
            e
        })
    });
}

fn clone_bench(c: &mut Criterion) {
    let base = react_013();
    // A clone only restores its isolate on first use, so warm it with a no-op.
    c.bench_function("clone react 0.13", |b| {
        b.iter_with_large_drop(|| {
            let mut e = base.clone();
            if let Err(err) = e.run_react("''") {
                panic!("warming clone: {err}");
            }
            e
        })
    });
}

fn render_div(c: &mut Criterion) {
    let mut e = react_013().clone();
    match e.run_react(fixtures::RENDER_DIV) {
        Ok(s) if fixtures::render_div_regex().is_match(&s) => {}
        other => panic!("render div produced {other:?}"),
    }
    c.bench_function("render div", |b| {
        b.iter(|| black_box(e.run_react(black_box(fixtures::RENDER_DIV))))
    });
}

fn render_components(c: &mut Criterion) {
    let mut e = react_013().clone();
    if let Err(err) = e.load(&fixtures::component_source()) {
        panic!("loading components.js: {err}");
    }
    match e.run_react(fixtures::RENDER_COMPONENTS) {
        Ok(s) if fixtures::missing_component_text(&s).is_empty() => {}
        other => panic!("render components produced {other:?}"),
    }
    c.bench_function("render components", |b| {
        b.iter(|| black_box(e.run_react(black_box(fixtures::RENDER_COMPONENTS))))
    });
}

criterion_group!(benches, load_bench, clone_bench, render_div, render_components);
criterion_main!(benches);
