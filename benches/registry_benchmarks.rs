use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use pi_pins::{
    ControllerConfig, Event, GpioService, Level, MockDriver, Pin, PinMode, PinOptions,
    PinRegistry, PullMode,
};
use std::sync::Arc;

fn registry() -> PinRegistry {
    PinRegistry::new(ControllerConfig::default(), Arc::new(MockDriver::new()))
}

/// Benchmark configure/release cycles through the registry lock
fn bench_configure_release(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("Should create tokio runtime");
    let registry = registry();

    c.bench_function("configure_release_output", |b| {
        b.to_async(&rt).iter(|| async {
            registry
                .configure(17, PinMode::Output, &PinOptions::new())
                .await
                .expect("Should configure");
            registry.release(17).await.expect("Should release");
        })
    });
}

/// Benchmark single-pin writes and reads
fn bench_write_read(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("Should create tokio runtime");
    let registry = registry();
    rt.block_on(async {
        registry
            .configure(17, PinMode::Output, &PinOptions::new())
            .await
            .expect("Should configure output");
        registry
            .configure(27, PinMode::Input, &PinOptions::new())
            .await
            .expect("Should configure input");
    });

    c.bench_function("write_output", |b| {
        b.to_async(&rt)
            .iter(|| async { registry.write(17, Level::High).await.expect("Should write") })
    });

    c.bench_function("read_input", |b| {
        b.to_async(&rt)
            .iter(|| async { registry.read(27).await.expect("Should read") })
    });
}

/// Benchmark event fan-out with a growing number of subscribers
fn bench_publish(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().expect("Should create tokio runtime");
    let service = GpioService::new(ControllerConfig::default(), Arc::new(MockDriver::new()))
        .expect("Should create service");
    let mut group = c.benchmark_group("publish_readings");

    for subscribers in [1usize, 10, 100].iter() {
        let _subs: Vec<_> = (0..*subscribers).map(|_| service.subscribe()).collect();
        let readings = rt.block_on(async {
            let mut readings = Vec::new();
            for pin in [17, 22, 27] {
                readings.push(
                    service
                        .configure(pin, PinMode::Input, &PinOptions::new())
                        .await
                        .expect("Should configure"),
                );
            }
            readings
        });

        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            subscribers,
            |b, _| b.iter(|| service.events().publish(Event::readings(readings.clone()))),
        );
    }

    group.finish();
}

/// Benchmark JSON serialization of a readings event
fn bench_event_serialization(c: &mut Criterion) {
    let readings: Vec<Pin> = (2..28)
        .map(|pin| Pin {
            pin,
            mode: PinMode::Input,
            value: Level::High,
            pull: PullMode::Up,
            pwm_frequency: None,
            pwm_duty_cycle: None,
            is_reserved: false,
            is_available: true,
        })
        .collect();
    let event = Event::readings(readings);

    c.bench_function("readings_json_serialization", |b| {
        b.iter(|| serde_json::to_string(&event).expect("Should serialize"))
    });
}

criterion_group!(
    benches,
    bench_configure_release,
    bench_write_read,
    bench_publish,
    bench_event_serialization
);
criterion_main!(benches);
