use criterion::{BatchSize, BenchmarkId, Criterion};

use slotpool::resources::ResourceCounter;

use crate::utils::{cpus, create_offers, gateway, location, runtime, start_pool};

fn bench_requirement_changes(c: &mut Criterion) {
    let rt = runtime();
    for count in [10, 1_000] {
        c.bench_with_input(
            BenchmarkId::new("increase and drop requirements", count),
            &count,
            |b, &count| {
                b.iter_batched(
                    || {
                        let service = start_pool(&rt);
                        rt.block_on(service.offer_slots(
                            location(1),
                            gateway(),
                            create_offers(0, count / 2, &cpus(1)),
                        ))
                        .unwrap();
                        service
                    },
                    |service| {
                        rt.block_on(async {
                            service
                                .set_resource_requirements(ResourceCounter::with_resource(
                                    cpus(1),
                                    count,
                                ))
                                .await
                                .unwrap();
                            service
                                .set_resource_requirements(ResourceCounter::empty())
                                .await
                                .unwrap();
                        });
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }
}

pub fn benchmark(c: &mut Criterion) {
    bench_requirement_changes(c);
}
