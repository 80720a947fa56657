use std::io;
use std::sync::{Arc, Mutex};
use tick_host::{Availability, CapabilitySet, EventLoop, Primitive};
use tick_scheduler::{DeferError, Scheduler, SchedulerConfig, Tier};

#[test]
fn test_config_from_json() {
    let config = SchedulerConfig::from_json(
        r#"{
            "initial_tier": "low",
            "disabled_primitives": ["resolved_promise", "message_channel"]
        }"#,
    )
    .unwrap();

    assert_eq!(config.initial_tier, Tier::Low);
    assert_eq!(
        config.disabled_primitives,
        vec![Primitive::ResolvedPromise, Primitive::MessageChannel]
    );
    // Missing fields keep their defaults.
    assert_eq!(config.slow_batch_threshold, 1024);
}

#[test]
fn test_invalid_config_is_an_error() {
    let err = SchedulerConfig::from_json(r#"{ "initial_tier": "urgent" }"#).unwrap_err();
    assert!(matches!(err, DeferError::Config(_)));
    assert!(err.to_string().starts_with("invalid scheduler configuration"));
}

#[test]
fn test_disabled_primitives_are_masked_before_selection() {
    let host = EventLoop::new(CapabilitySet::browser());
    let config = SchedulerConfig {
        disabled_primitives: vec![Primitive::ResolvedPromise],
        ..SchedulerConfig::default()
    };
    let scheduler = Scheduler::with_config(&host, config);

    assert_eq!(scheduler.capabilities().resolved_promise, Availability::Absent);
    let triggers = scheduler.triggers();
    assert!(triggers.shares_trigger());
    assert_eq!(triggers.high.primitive(), Primitive::MessageChannel);

    scheduler.register_callback(|_| {}, None);
    assert_eq!(host.stats().microtasks_queued, 0);
    assert_eq!(host.stats().messages_posted, 1);
}

#[test]
fn test_oversized_batch_still_drains() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let host = EventLoop::new(CapabilitySet::browser());
    let scheduler = Scheduler::with_config(
        &host,
        SchedulerConfig {
            slow_batch_threshold: 2,
            ..SchedulerConfig::default()
        },
    );

    for _ in 0..5 {
        scheduler.register_callback(|_| {}, None);
    }
    host.run_until_idle();
    assert_eq!(scheduler.stats().queue.thunks_run, 5);
}

#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn drain_with_threshold(callbacks: usize) -> String {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .finish();

    tracing::subscriber::with_default(subscriber, || {
        let host = EventLoop::new(CapabilitySet::browser());
        let scheduler = Scheduler::with_config(
            &host,
            SchedulerConfig {
                slow_batch_threshold: 1,
                ..SchedulerConfig::default()
            },
        );
        for _ in 0..callbacks {
            scheduler.register_callback(|_| {}, None);
        }
        host.run_until_idle();
    });
    logs.contents()
}

#[test]
fn test_batch_over_threshold_logs_warning() {
    let output = drain_with_threshold(2);
    assert!(output.contains("WARN"));
    assert!(output.contains("oversized deferred-callback batch"));
    assert!(output.contains("ran=2"));
    assert!(output.contains("threshold=1"));
}

#[test]
fn test_batch_at_threshold_is_quiet() {
    let output = drain_with_threshold(1);
    assert!(!output.contains("oversized deferred-callback batch"));
}
