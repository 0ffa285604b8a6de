use ctlbridge::{
    callback_fn, BridgeError, ContextRegistry, ControlAction, ControlHandlerResult, Dispatcher,
    HandleTable, MmsValue, OwnerHandle, RegistrationHandle,
};
use parking_lot::Mutex;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

/// (owner tag, action, path, value, test)
type Call = (String, usize, String, usize, bool);

struct Harness {
    registry: ContextRegistry,
    dispatcher: Dispatcher,
    table: Arc<HandleTable>,
}

impl Harness {
    fn new() -> Self {
        let table = Arc::new(HandleTable::new());
        Self {
            registry: ContextRegistry::with_table(Arc::clone(&table)),
            dispatcher: Dispatcher::new(Arc::clone(&table)),
            table,
        }
    }

    /// Register a callback that records every call together with the owner tag
    fn record(&self, owner: &str, path: &str, log: &Arc<Mutex<Vec<Call>>>) -> RegistrationHandle {
        let sink = Arc::clone(log);
        self.registry
            .register_fn(Arc::new(owner.to_string()), path, move |owner, req| {
                let tag = owner.downcast_ref::<String>().cloned().unwrap_or_default();
                sink.lock().push((
                    tag,
                    req.action.addr(),
                    req.path.to_string(),
                    req.value.addr(),
                    req.test,
                ));
                Ok(ControlHandlerResult::Ok)
            })
            .unwrap()
    }

    fn fire(
        &self,
        handle: RegistrationHandle,
        action: usize,
        value: usize,
        test: bool,
    ) -> ControlHandlerResult {
        self.dispatcher.dispatch_handle(
            handle,
            ControlAction::from_addr(action),
            MmsValue::from_addr(value),
            test,
        )
    }
}

#[test]
fn test_end_to_end_single_invocation() {
    let h = Harness::new();
    let log: Arc<Mutex<Vec<Call>>> = Arc::default();
    let handle = h.record("selfA", "Disconnector1.Pos", &log);

    let status = h.fire(handle, 0x1111, 0x2222, false);

    assert_eq!(status, ControlHandlerResult::Ok);
    assert_eq!(
        *log.lock(),
        vec![(
            "selfA".to_string(),
            0x1111,
            "Disconnector1.Pos".to_string(),
            0x2222,
            false
        )]
    );
}

#[test]
fn test_paths_are_independent() {
    let h = Harness::new();
    let log_a: Arc<Mutex<Vec<Call>>> = Arc::default();
    let log_b: Arc<Mutex<Vec<Call>>> = Arc::default();
    let handle_a = h.record("a", "XCBR1.Pos", &log_a);
    let _handle_b = h.record("b", "XCBR2.Pos", &log_b);

    h.fire(handle_a, 1, 2, false);

    assert_eq!(log_a.lock().len(), 1);
    assert!(log_b.lock().is_empty());
}

#[test]
fn test_reregistration_replaces_previous_callback() {
    let h = Harness::new();
    let log_first: Arc<Mutex<Vec<Call>>> = Arc::default();
    let log_second: Arc<Mutex<Vec<Call>>> = Arc::default();

    let first_owner: OwnerHandle = Arc::new(String::from("o1"));
    let first_probe = Arc::downgrade(&first_owner);
    let sink = Arc::clone(&log_first);
    let first = h
        .registry
        .register_fn(first_owner, "CSWI1.Pos", move |_, req| {
            sink.lock().push((
                "o1".to_string(),
                req.action.addr(),
                req.path.to_string(),
                req.value.addr(),
                req.test,
            ));
            Ok(ControlHandlerResult::Ok)
        })
        .unwrap();

    let second = h.record("o2", "CSWI1.Pos", &log_second);

    assert_eq!(h.fire(second, 3, 4, false), ControlHandlerResult::Ok);
    assert_eq!(log_second.lock().len(), 1);
    assert!(log_first.lock().is_empty());

    // The first bundle is gone: its owner is freed and its handle is dead
    assert!(first_probe.upgrade().is_none());
    assert_eq!(h.fire(first, 3, 4, false), ControlHandlerResult::Failed);
    assert!(log_first.lock().is_empty());
    assert_eq!(h.registry.len(), 1);
    assert_eq!(h.table.len(), 1);
}

#[test]
fn test_malformed_handle_never_invokes() {
    let h = Harness::new();
    let log: Arc<Mutex<Vec<Call>>> = Arc::default();
    let _handle = h.record("a", "GGIO1.SPCSO1", &log);

    for bogus in [0usize, usize::MAX, 0xDEAD_BEEF] {
        let err = h
            .dispatcher
            .try_dispatch(
                bogus as *mut std::ffi::c_void,
                ControlAction::from_addr(1),
                MmsValue::from_addr(1),
                false,
            )
            .unwrap_err();
        assert!(matches!(err, BridgeError::TypeMismatch(_)), "{bogus:#x}: {err}");
    }

    assert!(log.lock().is_empty());
    assert_eq!(h.dispatcher.stats().rejected, 3);
    assert_eq!(h.dispatcher.stats().completed, 0);
}

#[test]
fn test_failed_dispatch_reports_to_error_channel() {
    let h = Harness::new();
    ctlbridge::errors::clear_last_error();

    let status = h.dispatcher.dispatch(
        std::ptr::null_mut(),
        ControlAction::from_addr(1),
        MmsValue::from_addr(1),
        false,
    );

    assert_eq!(status, ControlHandlerResult::Failed);
    assert!(ctlbridge::errors::take_last_error()
        .unwrap()
        .contains("control handler context is null"));
}

#[test]
fn test_test_flag_passes_through() {
    let h = Harness::new();
    let log: Arc<Mutex<Vec<Call>>> = Arc::default();
    let handle = h.record("a", "XSWI1.Pos", &log);

    h.fire(handle, 1, 2, true);
    h.fire(handle, 1, 2, false);

    let flags: Vec<bool> = log.lock().iter().map(|call| call.4).collect();
    assert_eq!(flags, vec![true, false]);
}

#[test]
fn test_concurrent_dispatch_on_independent_paths() {
    let h = Arc::new(Harness::new());
    let counters: Vec<Arc<AtomicUsize>> = (0..2).map(|_| Arc::default()).collect();

    let handles: Vec<RegistrationHandle> = counters
        .iter()
        .enumerate()
        .map(|(i, counter)| {
            let counter = Arc::clone(counter);
            let expected_path = format!("XCBR{}.Pos", i);
            h.registry
                .register(
                    Arc::new(i),
                    callback_fn(move |owner, req| {
                        // Each callback only ever sees its own bundle
                        let idx = owner.downcast_ref::<usize>().copied();
                        if idx != Some(i) || req.path != expected_path {
                            return Ok(ControlHandlerResult::Failed);
                        }
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(ControlHandlerResult::Ok)
                    }),
                    format!("XCBR{}.Pos", i),
                )
                .unwrap()
        })
        .collect();

    const ROUNDS: usize = 200;
    let barrier = Arc::new(Barrier::new(handles.len()));
    let workers: Vec<_> = handles
        .iter()
        .copied()
        .map(|handle| {
            let h = Arc::clone(&h);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                (0..ROUNDS)
                    .map(|n| h.fire(handle, n, n, n % 2 == 0))
                    .filter(|status| *status == ControlHandlerResult::Ok)
                    .count()
            })
        })
        .collect();

    for worker in workers {
        assert_eq!(worker.join().unwrap(), ROUNDS);
    }
    for counter in &counters {
        assert_eq!(counter.load(Ordering::SeqCst), ROUNDS);
    }
    assert_eq!(h.dispatcher.stats().completed, (ROUNDS * 2) as u64);
}

#[test]
fn test_registration_races_on_same_path() {
    let h = Arc::new(Harness::new());
    let workers: Vec<_> = (0..8)
        .map(|i| {
            let h = Arc::clone(&h);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    h.registry
                        .register_fn(Arc::new(i), "CSWI9.Pos", |_, _| Ok(ControlHandlerResult::Ok))
                        .unwrap();
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    // Exactly one bundle survives, and it is the only live handle
    assert_eq!(h.registry.len(), 1);
    assert_eq!(h.table.len(), 1);
    let live = h.registry.handle_for("CSWI9.Pos").unwrap();
    assert!(h.table.is_live(live));
}

proptest! {
    #[test]
    fn test_dispatch_reaches_only_its_own_path(
        paths in prop::collection::hash_set("[A-Z]{4}[0-9]\\.[A-Za-z]{3}", 1..8),
        pick in any::<prop::sample::Index>(),
    ) {
        let h = Harness::new();
        let paths: Vec<String> = paths.into_iter().collect();
        let logs: Vec<Arc<Mutex<Vec<Call>>>> = paths.iter().map(|_| Arc::default()).collect();
        let handles: Vec<_> = paths
            .iter()
            .zip(&logs)
            .map(|(path, log)| h.record(path, path, log))
            .collect();

        let target = pick.index(paths.len());
        prop_assert_eq!(h.fire(handles[target], 7, 8, false), ControlHandlerResult::Ok);

        for (i, log) in logs.iter().enumerate() {
            let calls = log.lock();
            if i == target {
                prop_assert_eq!(calls.len(), 1);
                prop_assert_eq!(&calls[0].2, &paths[i]);
            } else {
                prop_assert!(calls.is_empty());
            }
        }
    }
}
