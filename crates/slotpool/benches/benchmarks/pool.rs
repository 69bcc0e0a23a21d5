use criterion::{BatchSize, BenchmarkId, Criterion};

use slotpool::SlotRequestId;

use crate::utils::{cpus, create_offers, gateway, location, runtime, start_pool, wait_all};

fn bench_serve_pending_requests(c: &mut Criterion) {
    let rt = runtime();
    for count in [10, 1_000, 10_000] {
        c.bench_with_input(
            BenchmarkId::new("serve pending requests", count),
            &count,
            |b, &count| {
                b.iter_batched(
                    || {
                        let service = start_pool(&rt);
                        let futures: Vec<_> = (0..count)
                            .map(|_| {
                                service.request_new_allocated_batch_slot(
                                    service.new_request_id(),
                                    cpus(1),
                                )
                            })
                            .collect();
                        (service, futures)
                    },
                    |(service, futures)| {
                        rt.block_on(service.offer_slots(
                            location(1),
                            gateway(),
                            create_offers(0, count, &cpus(1)),
                        ))
                        .unwrap();
                        wait_all(&rt, futures);
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }
}

fn bench_request_idle_slots(c: &mut Criterion) {
    let rt = runtime();
    for count in [10, 1_000, 10_000] {
        c.bench_with_input(
            BenchmarkId::new("request idle slots", count),
            &count,
            |b, &count| {
                b.iter_batched(
                    || {
                        let service = start_pool(&rt);
                        rt.block_on(service.offer_slots(
                            location(1),
                            gateway(),
                            create_offers(0, count, &cpus(2)),
                        ))
                        .unwrap();
                        service
                    },
                    |service| {
                        let futures: Vec<_> = (0..count)
                            .map(|i| {
                                service.request_new_allocated_batch_slot(
                                    SlotRequestId::new(i as u64),
                                    cpus(1),
                                )
                            })
                            .collect();
                        wait_all(&rt, futures);
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }
}

fn bench_release_slots(c: &mut Criterion) {
    let rt = runtime();
    for count in [10, 1_000] {
        c.bench_with_input(
            BenchmarkId::new("release slots", count),
            &count,
            |b, &count| {
                b.iter_batched(
                    || {
                        let service = start_pool(&rt);
                        // Twice as many requests as slots, half of them stay pending
                        let futures: Vec<_> = (0..2 * count)
                            .map(|i| {
                                service.request_new_allocated_batch_slot(
                                    SlotRequestId::new(i as u64),
                                    cpus(1),
                                )
                            })
                            .collect();
                        rt.block_on(service.offer_slots(
                            location(1),
                            gateway(),
                            create_offers(0, count, &cpus(1)),
                        ))
                        .unwrap();
                        (service, futures)
                    },
                    |(service, futures)| {
                        rt.block_on(async {
                            for i in 0..count {
                                service
                                    .release_slot(SlotRequestId::new(i as u64), "benchmark")
                                    .await
                                    .unwrap();
                            }
                        });
                        wait_all(&rt, futures);
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }
}

pub fn benchmark(c: &mut Criterion) {
    bench_serve_pending_requests(c);
    bench_request_idle_slots(c);
    bench_release_slots(c);
}
