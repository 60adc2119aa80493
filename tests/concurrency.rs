use fluent_throttle::infrastructure::mocks::{CaptureBackend, MockClock};
use fluent_throttle::{FluentLogger, TimeUnit};
use std::sync::{Arc, Barrier};
use std::thread;

fn logger(backend: &CaptureBackend, clock: &MockClock) -> FluentLogger {
    FluentLogger::builder()
        .with_name("concurrency")
        .with_backend(Arc::new(backend.clone()))
        .with_clock(Arc::new(clock.clone()))
        .build()
        .unwrap()
}

#[test]
fn test_high_concurrency_stress() {
    let backend = CaptureBackend::new();
    let logger = logger(&backend, &MockClock::new());
    let log = |logger: &FluentLogger| logger.at_info().every(10).unwrap().log("contended").unwrap();

    // 8 threads x 1000 invocations of one log site
    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..1000 {
                    log(&logger);
                }
            });
        }
    });

    // Every invocation either takes the slot or counts down, so contention
    // does not change the period.
    let metrics = logger.metrics().snapshot();
    assert_eq!(metrics.statements_emitted, 800);
    assert_eq!(metrics.statements_skipped, 7200);
    assert_eq!(backend.count(), 800);
}

#[test]
fn test_concurrent_first_calls_emit_once() {
    let backend = CaptureBackend::new();
    let logger = logger(&backend, &MockClock::new());
    let barrier = Barrier::new(16);
    let log = |logger: &FluentLogger| {
        logger
            .at_info()
            .every(1_000_000)
            .unwrap()
            .log("first")
            .unwrap()
    };

    thread::scope(|s| {
        for _ in 0..16 {
            s.spawn(|| {
                barrier.wait();
                log(&logger);
            });
        }
    });

    assert_eq!(backend.count(), 1);
    assert_eq!(logger.metrics().statements_skipped(), 15);
}

#[test]
fn test_concurrent_period_emits_once() {
    let backend = CaptureBackend::new();
    let logger = logger(&backend, &MockClock::starting_at(42));
    let barrier = Barrier::new(16);
    let log = |logger: &FluentLogger| {
        logger
            .at_info()
            .at_most_every(1, TimeUnit::Hours)
            .unwrap()
            .log("hourly")
            .unwrap()
    };

    thread::scope(|s| {
        for _ in 0..16 {
            s.spawn(|| {
                barrier.wait();
                for _ in 0..10 {
                    log(&logger);
                }
            });
        }
    });

    assert_eq!(backend.count(), 1);
    assert_eq!(logger.metrics().statements_skipped(), 159);
}
