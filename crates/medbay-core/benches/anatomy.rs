use criterion::{black_box, criterion_group, criterion_main, Criterion};
use medbay_core::prelude::*;

fn populated_engine(bodies: usize) -> (SurgeryEngine, Vec<hecs::Entity>) {
    let mut engine =
        SurgeryEngine::with_bundled_content(SurgeryConfig::default().with_seed(1)).unwrap();
    let mut spawned = Vec::with_capacity(bodies);
    for i in 0..bodies {
        let body = engine.spawn_body("Human", Vec3::new(i as f32 * 2.0, 0.0, 0.0));
        engine.body_ready(body);
        spawned.push(body);
    }
    (engine, spawned)
}

fn bench_query_children(c: &mut Criterion) {
    let (engine, bodies) = populated_engine(200);
    let body = bodies[bodies.len() / 2];

    c.bench_function("query_children_all", |b| {
        b.iter(|| engine.query_children(black_box(body), None, None))
    });
    c.bench_function("query_children_left_arm", |b| {
        b.iter(|| {
            engine.query_children(
                black_box(body),
                Some(PartType::Arm),
                Some(Symmetry::Left),
            )
        })
    });
}

fn bench_body_init(c: &mut Criterion) {
    c.bench_function("initialize_human", |b| {
        b.iter(|| populated_engine(black_box(1)))
    });
}

criterion_group!(benches, bench_query_children, bench_body_init);
criterion_main!(benches);
