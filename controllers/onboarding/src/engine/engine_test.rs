//! Unit tests for the reconcile engine

#[cfg(test)]
mod tests {
    use super::super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn id(resource_id: &str) -> ReconcileId {
        ReconcileId {
            tenant_id: "tenant-1".to_string(),
            resource_id: resource_id.to_string(),
        }
    }

    /// Records calls and concurrency, answers with scripted directives
    #[derive(Default)]
    struct Recorder {
        script: Mutex<VecDeque<fn() -> Directive>>,
        calls: Mutex<Vec<String>>,
        active: Mutex<HashMap<String, usize>>,
        max_active_per_id: AtomicUsize,
        active_total: AtomicUsize,
        max_active_total: AtomicUsize,
        work: Duration,
        cancel_on_call: Option<CancellationToken>,
    }

    impl Recorder {
        fn with_script(script: Vec<fn() -> Directive>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Reconcile for Recorder {
        async fn reconcile(&self, id: &ReconcileId) -> Directive {
            self.calls.lock().unwrap().push(id.resource_id.clone());
            {
                let mut active = self.active.lock().unwrap();
                let count = active.entry(id.resource_id.clone()).or_default();
                *count += 1;
                self.max_active_per_id.fetch_max(*count, Ordering::SeqCst);
            }
            let total = self.active_total.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active_total.fetch_max(total, Ordering::SeqCst);

            if let Some(cancel) = &self.cancel_on_call {
                cancel.cancel();
            }
            if !self.work.is_zero() {
                tokio::time::sleep(self.work).await;
            }

            self.active_total.fetch_sub(1, Ordering::SeqCst);
            *self.active.lock().unwrap().get_mut(&id.resource_id).unwrap() -= 1;
            self.script.lock().unwrap().pop_front().map_or(Directive::Ack, |next| next())
        }
    }

    fn retry() -> Directive {
        Directive::retry(anyhow::anyhow!("not yet"))
    }

    fn ack() -> Directive {
        Directive::Ack
    }

    fn fail() -> Directive {
        Directive::fail(anyhow::anyhow!("broken"))
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_for_busy_identity_coalesce_into_one_rerun() {
        let recorder = Arc::new(Recorder {
            work: Duration::from_millis(100),
            ..Recorder::default()
        });
        let mut engine = ReconcileEngine::new(4, 16);
        engine.register(ResourceKind::Host, recorder.clone());
        let handle = engine.handle();
        for _ in 0..5 {
            assert!(handle.enqueue(id("host-1")).await);
        }
        drop(handle);

        engine.run(CancellationToken::new()).await;

        assert_eq!(recorder.calls(), vec!["host-1", "host-1"]);
        assert_eq!(recorder.max_active_per_id.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_backs_off_then_stops_on_ack() {
        let recorder = Arc::new(Recorder::with_script(vec![retry as fn() -> Directive, retry, ack]));
        let mut engine = ReconcileEngine::new(1, 4);
        engine.register(ResourceKind::Instance, recorder.clone());
        let handle = engine.handle();
        handle.enqueue(id("inst-1")).await;
        drop(handle);

        let started = tokio::time::Instant::now();
        engine.run(CancellationToken::new()).await;

        assert_eq!(recorder.calls().len(), 3);
        // 1s then 2s
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_is_not_retried() {
        let recorder = Arc::new(Recorder::with_script(vec![fail as fn() -> Directive]));
        let mut engine = ReconcileEngine::new(1, 4);
        engine.register(ResourceKind::Os, recorder.clone());
        let handle = engine.handle();
        handle.enqueue(id("os-1")).await;
        drop(handle);

        engine.run(CancellationToken::new()).await;

        assert_eq!(recorder.calls(), vec!["os-1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallelism_bounds_distinct_identities() {
        let recorder = Arc::new(Recorder {
            work: Duration::from_millis(50),
            ..Recorder::default()
        });
        let mut engine = ReconcileEngine::new(2, 16);
        engine.register(ResourceKind::Host, recorder.clone());
        let handle = engine.handle();
        for n in 0..5 {
            handle.enqueue(id(&format!("host-{n}"))).await;
        }
        drop(handle);

        engine.run(CancellationToken::new()).await;

        assert_eq!(recorder.calls().len(), 5);
        assert_eq!(recorder.max_active_total.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_retries() {
        let cancel = CancellationToken::new();
        let recorder = Arc::new(Recorder {
            script: Mutex::new(vec![retry as fn() -> Directive; 10].into()),
            cancel_on_call: Some(cancel.clone()),
            work: Duration::from_millis(10),
            ..Recorder::default()
        });
        let mut engine = ReconcileEngine::new(1, 4);
        engine.register(ResourceKind::Host, recorder.clone());
        let handle = engine.handle();
        handle.enqueue(id("host-1")).await;

        // The handle stays alive: only cancellation can stop the engine
        engine.run(cancel).await;

        assert_eq!(recorder.calls().len(), 1);
        // In-flight work finished before run returned
        assert_eq!(recorder.active_total.load(Ordering::SeqCst), 0);
        assert!(!handle.enqueue(id("host-1")).await);
    }

    #[tokio::test]
    async fn test_unroutable_identity_is_dropped() {
        let recorder = Arc::new(Recorder::default());
        let mut engine = ReconcileEngine::new(1, 4);
        engine.register(ResourceKind::Host, recorder.clone());
        let handle = engine.handle();
        handle.enqueue(id("inst-1")).await;
        handle.enqueue(id("bogus")).await;
        drop(handle);

        engine.run(CancellationToken::new()).await;

        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn test_directive_helpers() {
        assert!(Directive::Ack.is_ack());
        assert!(retry().is_retry());
        assert!(fail().is_fail());
        match retry() {
            Directive::Retry { backoff, .. } => {
                assert_eq!(backoff.min, Duration::from_secs(1));
                assert_eq!(backoff.max, Duration::from_secs(30));
            }
            other => panic!("unexpected directive {other:?}"),
        }
    }
}
