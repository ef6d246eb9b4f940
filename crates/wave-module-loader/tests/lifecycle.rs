//! Lifecycle controller integration tests

mod common;

use common::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use wave_module_loader::prelude::*;
use wave_module_loader::{
    ErrorKind, ModuleState, NativeBackend, ReloadPhase, StaticLibrary,
};

#[test]
fn test_load_echo() {
    let (loader, backend) = loader_with(ReloadStrategy::Atomic);
    register(&backend, "/x/echo.so", create_echo);
    let log = EventLog::attach(&loader);

    let echo = loader.load("/x/echo.so").unwrap();

    assert_eq!(echo.name, "Echo");
    assert_eq!(echo.version, "1.0.0");
    assert_eq!(echo.path, PathBuf::from("/x/echo.so"));
    assert_eq!(echo.state, ModuleState::Active);
    assert!(echo.loaded_at.is_some());

    assert_eq!(log.kinds(), vec![LifecycleEventKind::Loaded]);
    assert_eq!(log.events()[0].module, echo);
    assert_eq!(log.events()[0].message, "Module loaded successfully.");
    assert_eq!(loader.list_all(), vec![echo]);
}

#[test]
fn test_load_missing_library_reports_platform_diagnostic() {
    let loader = ModuleLoader::builder().backend(NativeBackend::new()).build();
    let log = EventLog::attach(&loader);

    let err = loader.load("/x/missing.so").unwrap_err();

    assert_eq!(err.kind(), ErrorKind::LoadFailure);
    assert_eq!(err.status(), OperationStatus::Error);
    assert!(err.to_string().starts_with("Failed to load library: /x/missing.so"));
    assert!(err.to_string().contains("missing.so ("));

    assert_eq!(log.kinds(), vec![LifecycleEventKind::ErrorLoading]);
    assert_eq!(log.events()[0].module.path, PathBuf::from("/x/missing.so"));
    assert!(loader.is_empty());
}

#[test]
fn test_host_capability_is_forwarded() {
    #[derive(Debug)]
    struct Services {
        app: &'static str,
    }

    let backend = wave_module_loader::StaticBackend::new();
    register(&backend, "/x/probe.so", create_probe);
    let host = HostCapability::new(Services { app: "wave" });
    let loader = ModuleLoader::builder()
        .backend(backend)
        .host(host.clone())
        .build();

    loader.load("/x/probe.so").unwrap();

    let received = probe_calls().last_host().unwrap();
    assert!(received.ptr_eq(&host));
    assert_eq!(received.downcast_ref::<Services>().map(|s| s.app), Some("wave"));
}

#[test]
fn test_same_path_twice_is_rejected() {
    let (loader, backend) = loader_with(ReloadStrategy::Atomic);
    register(&backend, "/x/alpha.so", create_alpha);
    let log = EventLog::attach(&loader);

    let first = loader.load("/x/alpha.so").unwrap();
    let err = loader.load("/x/alpha.so").unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AlreadyLoaded);
    assert_eq!(err.snapshot(), Some(&first));
    assert_eq!(loader.len(), 1);
    assert_eq!(backend.open_handles("/x/alpha.so"), 1);
    assert_eq!(log.kinds(), vec![LifecycleEventKind::Loaded]);
}

#[test]
fn test_load_unload_round_trip() {
    let (loader, backend) = loader_with(ReloadStrategy::Atomic);
    register(&backend, "/x/round_trip.so", create_round_trip);
    register(&backend, "/x/beta.so", create_beta);
    loader.load("/x/beta.so").unwrap();

    let before = loader.list_all();
    let log = EventLog::attach(&loader);

    let module = loader.load("/x/round_trip.so").unwrap();
    let unloaded = loader.unload(&module.name).unwrap();

    assert_eq!(unloaded, module);
    assert_eq!(loader.list_all(), before);
    assert_eq!(backend.open_handles("/x/round_trip.so"), 0);
    assert_eq!(round_trip_calls().shutdown_count(), 1);
    assert_eq!(round_trip_calls().drop_count(), 1);
    assert_eq!(
        log.kinds(),
        vec![LifecycleEventKind::Loaded, LifecycleEventKind::Unloaded]
    );
    assert_eq!(log.events()[1].message, "Module unloaded successfully.");
}

#[test]
fn test_unload_never_loaded() {
    let (loader, backend) = loader_with(ReloadStrategy::Atomic);
    register(&backend, "/x/alpha.so", create_alpha);
    loader.load("/x/alpha.so").unwrap();
    let log = EventLog::attach(&loader);
    let before = loader.list_all();

    for _ in 0..2 {
        let err = loader.unload("never-loaded").unwrap_err();
        assert_eq!(err.status(), OperationStatus::NotFound);
        assert_eq!(loader.list_all(), before);
    }

    assert_eq!(log.count(LifecycleEventKind::ErrorUnloading), 2);
    assert_eq!(log.events()[0].message, "Module not found for unloading.");
}

#[test]
fn test_missing_factory_symbol() {
    let (loader, backend) = loader_with(ReloadStrategy::Atomic);
    backend.register("/x/empty.so", StaticLibrary::empty());
    let log = EventLog::attach(&loader);

    let err = loader.load("/x/empty.so").unwrap_err();

    assert_eq!(err.kind(), ErrorKind::SymbolNotFound);
    assert!(err.to_string().contains("create_module_instance"));
    assert_eq!(backend.open_handles("/x/empty.so"), 0);
    assert_eq!(log.kinds(), vec![LifecycleEventKind::ErrorLoading]);
}

#[test]
fn test_null_and_panicking_factories() {
    let (loader, backend) = loader_with(ReloadStrategy::Atomic);
    backend.register("/x/null.so", StaticLibrary::module(create_null, None));
    backend.register("/x/boom.so", StaticLibrary::module(create_panicking, None));
    let log = EventLog::attach(&loader);

    let err = loader.load("/x/null.so").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstructionFailure);
    assert!(err.to_string().contains("null"));

    let err = loader.load("/x/boom.so").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstructionFailure);
    assert!(err.to_string().contains("factory exploded"));

    assert_eq!(backend.total_open_handles(), 0);
    assert_eq!(log.count(LifecycleEventKind::ErrorLoading), 2);
    assert!(loader.is_empty());
}

#[test]
fn test_initialization_failure_cleans_up() {
    let (loader, backend) = loader_with(ReloadStrategy::Atomic);
    register(&backend, "/x/failing.so", create_failing_init);
    register(&backend, "/x/panicking.so", create_panicking_init);
    let log = EventLog::attach(&loader);

    let err = loader.load("/x/failing.so").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InitializationFailure);
    assert!(err.to_string().contains("FailingInit"));
    assert_eq!(failing_init_calls().initialize_count(), 1);
    assert_eq!(failing_init_calls().shutdown_count(), 0);
    assert_eq!(failing_init_calls().drop_count(), 1);

    let err = loader.load("/x/panicking.so").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InitializationFailure);
    assert_eq!(panicking_init_calls().drop_count(), 1);

    assert_eq!(backend.total_open_handles(), 0);
    assert!(loader.is_empty());
    assert_eq!(
        log.kinds(),
        vec![LifecycleEventKind::ErrorLoading, LifecycleEventKind::ErrorLoading]
    );
    assert_eq!(log.events()[0].module.name, "FailingInit");
}

#[test]
fn test_duplicate_name_is_rejected() {
    let (loader, backend) = loader_with(ReloadStrategy::Atomic);
    register(&backend, "/x/clash_a.so", create_clash);
    register(&backend, "/x/clash_b.so", create_clash);
    let log = EventLog::attach(&loader);

    loader.load("/x/clash_a.so").unwrap();
    let err = loader.load("/x/clash_b.so").unwrap_err();

    match &err {
        LoaderError::DuplicateName {
            name,
            path,
            existing_path,
        } => {
            assert_eq!(name, "Clash");
            assert_eq!(path, Path::new("/x/clash_b.so"));
            assert_eq!(existing_path, Path::new("/x/clash_a.so"));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    // The rejected instance is destroyed without being shut down
    assert_eq!(clash_calls().initialize_count(), 2);
    assert_eq!(clash_calls().shutdown_count(), 0);
    assert_eq!(clash_calls().drop_count(), 1);
    assert_eq!(backend.open_handles("/x/clash_b.so"), 0);
    assert_eq!(loader.list_all().len(), 1);
    assert_eq!(
        log.kinds(),
        vec![LifecycleEventKind::Loaded, LifecycleEventKind::ErrorLoading]
    );
}

#[test]
fn test_shutdown_and_destructor_faults_do_not_abort_unload() {
    let (loader, backend) = loader_with(ReloadStrategy::Atomic);
    backend.register(
        "/x/faulty.so",
        StaticLibrary::module(create_faulty_shutdown, Some(destroy_panicking)),
    );
    let log = EventLog::attach(&loader);

    loader.load("/x/faulty.so").unwrap();
    let unloaded = loader.unload("FaultyShutdown").unwrap();

    assert_eq!(unloaded.name, "FaultyShutdown");
    assert!(loader.is_empty());
    assert_eq!(backend.open_handles("/x/faulty.so"), 0);
    assert_eq!(faulty_shutdown_calls().shutdown_count(), 1);
    assert_eq!(faulty_shutdown_calls().drop_count(), 1);

    assert_eq!(
        log.kinds(),
        vec![
            LifecycleEventKind::Loaded,
            LifecycleEventKind::ErrorUnloading,
            LifecycleEventKind::ErrorUnloading,
            LifecycleEventKind::Unloaded,
        ]
    );
    let events = log.events();
    assert!(events[1].message.contains("shutdown() faulted"));
    assert!(events[2].message.contains("destructor exploded"));
}

#[test]
fn test_missing_destructor_leaves_instance_to_library() {
    let (loader, backend) = loader_with(ReloadStrategy::Atomic);
    backend.register("/x/leaky.so", StaticLibrary::module(create_leaky, None));

    let leaky = loader.load("/x/leaky.so").unwrap();
    assert!(!leaky.has_destructor);

    loader.unload("Leaky").unwrap();
    assert_eq!(leaky_calls().shutdown_count(), 1);
    assert_eq!(leaky_calls().drop_count(), 0);
    assert_eq!(backend.open_handles("/x/leaky.so"), 0);
}

#[test]
fn test_refused_close_keeps_module_resident() {
    let (loader, backend) = loader_with(ReloadStrategy::Atomic);
    backend.register(
        "/x/resident.so",
        StaticLibrary::module(create_resident, Some(destroy_module)).refuse_close(1),
    );
    let log = EventLog::attach(&loader);

    loader.load("/x/resident.so").unwrap();
    let err = loader.unload("Resident").unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnloadFailure);
    assert_eq!(err.status(), OperationStatus::Error);
    assert!(err.leaves_library_resident());

    // Instance is gone, library is still mapped and tracked
    let resident = loader.get("Resident").unwrap();
    assert_eq!(resident.state, ModuleState::Resident);
    assert_eq!(resident_calls().shutdown_count(), 1);
    assert_eq!(resident_calls().drop_count(), 1);
    assert_eq!(backend.open_handles("/x/resident.so"), 1);
    assert_eq!(
        log.kinds(),
        vec![LifecycleEventKind::Loaded, LifecycleEventKind::ErrorUnloading]
    );

    // The path stays reserved while resident
    assert_eq!(
        loader.load("/x/resident.so").unwrap_err().kind(),
        ErrorKind::AlreadyLoaded
    );

    // Retrying only retries the close
    loader.unload("Resident").unwrap();
    assert_eq!(resident_calls().shutdown_count(), 1);
    assert!(loader.is_empty());
    assert_eq!(backend.open_handles("/x/resident.so"), 0);
}

#[test]
fn test_teardown_unloads_everything_despite_failures() {
    let (loader, backend) = loader_with(ReloadStrategy::Atomic);
    register(&backend, "/x/teardown_a.so", create_teardown_a);
    register(&backend, "/x/teardown_b.so", create_teardown_b);
    loader.load("/x/teardown_a.so").unwrap();
    loader.load("/x/teardown_b.so").unwrap();
    let log = EventLog::attach(&loader);

    loader.shutdown();

    assert!(loader.is_empty());
    assert_eq!(backend.total_open_handles(), 0);
    assert_eq!(teardown_a_calls().shutdown_count(), 1);
    assert_eq!(teardown_b_calls().drop_count(), 1);
    assert_eq!(log.count(LifecycleEventKind::Unloaded), 0);
    assert_eq!(log.count(LifecycleEventKind::ErrorUnloading), 1);

    // Idempotent
    loader.shutdown();
    assert_eq!(log.events().len(), 1);
}

#[test]
fn test_callback_panic_does_not_reach_loader() {
    let (loader, backend) = loader_with(ReloadStrategy::Atomic);
    register(&backend, "/x/echo.so", create_echo);

    loader.subscribe(|_| panic!("observer bug"));
    let log = EventLog::attach(&loader);

    let echo = loader.load("/x/echo.so").unwrap();
    assert_eq!(echo.name, "Echo");
    assert_eq!(log.kinds(), vec![LifecycleEventKind::Loaded]);
    loader.unload("Echo").unwrap();
}

#[test]
fn test_unsubscribe_stops_delivery() {
    let (loader, backend) = loader_with(ReloadStrategy::Atomic);
    register(&backend, "/x/alpha.so", create_alpha);

    let observed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&observed);
    let id = loader.subscribe(move |event| {
        if event.kind == LifecycleEventKind::Loaded {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    loader.load("/x/alpha.so").unwrap();
    assert_eq!(observed.load(Ordering::SeqCst), 1);
    assert_eq!(loader.len(), 1);

    assert!(loader.unsubscribe(id));
    assert!(!loader.unsubscribe(id));
    loader.reload("Alpha").unwrap();
    loader.unload("Alpha").unwrap();
    assert_eq!(observed.load(Ordering::SeqCst), 1);
}

fn assert_reload_identity(strategy: ReloadStrategy) {
    let (loader, backend) = loader_with(strategy);
    register(&backend, "/x/echo.so", create_echo);
    let original = loader.load("/x/echo.so").unwrap();
    let log = EventLog::attach(&loader);

    let reloaded = loader.reload("Echo").unwrap();

    assert_eq!(reloaded.name, original.name);
    assert_eq!(reloaded.path, original.path);
    assert_eq!(loader.len(), 1);
    assert_eq!(backend.open_handles("/x/echo.so"), 1);

    assert_eq!(log.count(LifecycleEventKind::Reloaded), 1);
    assert_eq!(log.count(LifecycleEventKind::Unloaded), 0);
    assert_eq!(log.count(LifecycleEventKind::Loaded), 1);
    assert_eq!(
        log.kinds(),
        vec![LifecycleEventKind::Loaded, LifecycleEventKind::Reloaded]
    );
    assert_eq!(log.events()[1].message, "Module reloaded successfully.");
}

#[test]
fn test_reload_identity_atomic() {
    assert_reload_identity(ReloadStrategy::Atomic);
}

#[test]
fn test_reload_identity_release_lock() {
    assert_reload_identity(ReloadStrategy::ReleaseLock);
}

#[test]
fn test_reload_picks_up_new_library() {
    let (loader, backend) = loader_with(ReloadStrategy::Atomic);
    register(&backend, "/x/echo.so", create_echo);
    loader.load("/x/echo.so").unwrap();

    register(&backend, "/x/echo.so", create_echo_v2);
    let reloaded = loader.reload("Echo").unwrap();

    assert_eq!(reloaded.version, "2.0.0");
    assert_eq!(echo_v2_calls().initialize_count(), 1);
}

#[test]
fn test_reload_not_found() {
    let (loader, _backend) = loader_with(ReloadStrategy::Atomic);
    let log = EventLog::attach(&loader);

    let err = loader.reload("Ghost").unwrap_err();
    assert_eq!(err.status(), OperationStatus::NotFound);
    assert!(log.events().is_empty());
}

#[test]
fn test_reload_load_phase_failure_leaves_module_gone() {
    let (loader, backend) = loader_with(ReloadStrategy::Atomic);
    register(&backend, "/x/beta.so", create_beta);
    loader.load("/x/beta.so").unwrap();
    let log = EventLog::attach(&loader);

    backend.remove("/x/beta.so");
    let err = loader.reload("Beta").unwrap_err();

    match &err {
        LoaderError::ReloadFailed { phase, source, .. } => {
            assert_eq!(*phase, ReloadPhase::Load);
            assert_eq!(source.kind(), ErrorKind::LoadFailure);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!loader.contains("Beta"));
    assert_eq!(
        log.kinds(),
        vec![LifecycleEventKind::ErrorLoading, LifecycleEventKind::ErrorLoading]
    );
    assert!(log.events()[1]
        .message
        .starts_with("Failed to load module during reload:"));
}

#[test]
fn test_reload_unload_phase_failure_keeps_module_resident() {
    let (loader, backend) = loader_with(ReloadStrategy::Atomic);
    backend.register(
        "/x/busy.so",
        StaticLibrary::module(create_racer, Some(destroy_module)).refuse_close(1),
    );
    loader.load("/x/busy.so").unwrap();
    let log = EventLog::attach(&loader);

    let err = loader.reload("Racer").unwrap_err();

    assert!(matches!(
        err,
        LoaderError::ReloadFailed {
            phase: ReloadPhase::Unload,
            ..
        }
    ));
    assert!(err.leaves_library_resident());
    assert_eq!(loader.get("Racer").map(|m| m.state), Some(ModuleState::Resident));
    assert_eq!(log.count(LifecycleEventKind::ErrorUnloading), 2);
    assert!(log.events()[1]
        .message
        .starts_with("Failed to unload module during reload:"));

    loader.unload("Racer").unwrap();
}

#[test]
fn test_atomic_reload_never_exposes_absence() {
    let (loader, backend) = loader_with(ReloadStrategy::Atomic);
    register(&backend, "/x/echo.so", create_echo);
    loader.load("/x/echo.so").unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let observer = {
        let loader = Arc::clone(&loader);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut absent = 0;
            while !done.load(Ordering::SeqCst) {
                if !loader.contains("Echo") {
                    absent += 1;
                }
            }
            absent
        })
    };

    for _ in 0..200 {
        loader.reload("Echo").unwrap();
    }
    done.store(true, Ordering::SeqCst);

    assert_eq!(observer.join().unwrap(), 0);
}

#[test]
fn test_release_lock_reload_exposes_gap() {
    let (loader, backend) = loader_with(ReloadStrategy::ReleaseLock);
    register(&backend, "/x/echo.so", create_echo);
    loader.load("/x/echo.so").unwrap();

    let seen_absent = Arc::new(AtomicBool::new(false));
    let done = Arc::new(AtomicBool::new(false));
    let observer = {
        let loader = Arc::clone(&loader);
        let seen_absent = Arc::clone(&seen_absent);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            while !done.load(Ordering::SeqCst) {
                if !loader.contains("Echo") {
                    seen_absent.store(true, Ordering::SeqCst);
                    break;
                }
            }
        })
    };

    let deadline = Instant::now() + Duration::from_secs(10);
    while !seen_absent.load(Ordering::SeqCst) && Instant::now() < deadline {
        loader.reload("Echo").unwrap();
    }
    done.store(true, Ordering::SeqCst);
    observer.join().unwrap();

    assert!(seen_absent.load(Ordering::SeqCst));
    assert!(loader.contains("Echo"));
}

#[test]
fn test_release_lock_gap_lets_another_thread_claim_the_path() {
    let (loader, backend) = loader_with(ReloadStrategy::ReleaseLock);
    register(&backend, "/x/echo.so", create_echo);
    loader.load("/x/echo.so").unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let claimer = {
        let loader = Arc::clone(&loader);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            while !done.load(Ordering::SeqCst) {
                if let Ok(snapshot) = loader.load("/x/echo.so") {
                    return Some(snapshot);
                }
            }
            None
        })
    };

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut failure = None;
    while failure.is_none() && Instant::now() < deadline {
        if let Err(e) = loader.reload("Echo") {
            failure = Some(e);
        }
    }
    done.store(true, Ordering::SeqCst);
    let claimed = claimer.join().unwrap();

    let err = failure.expect("reload never lost the path to the other thread");
    match &err {
        LoaderError::ReloadFailed { name, phase, source } => {
            assert_eq!(name, "Echo");
            assert_eq!(*phase, ReloadPhase::Load);
            assert_eq!(source.kind(), ErrorKind::AlreadyLoaded);
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let claimed = claimed.expect("other thread never loaded the path");
    assert_eq!(loader.get("Echo"), Some(claimed));
    assert_eq!(loader.len(), 1);
    assert_eq!(backend.open_handles("/x/echo.so"), 1);
}

#[test]
fn test_concurrent_load_same_path_single_winner() {
    const THREADS: usize = 8;

    let (loader, backend) = loader_with(ReloadStrategy::Atomic);
    register(&backend, "/x/racer.so", create_racer);
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let loader = Arc::clone(&loader);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                loader.load("/x/racer.so")
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert!(matches!(
            err.kind(),
            ErrorKind::AlreadyLoaded | ErrorKind::DuplicateName
        ));
    }
    assert_eq!(loader.len(), 1);
    assert_eq!(backend.open_handles("/x/racer.so"), 1);
}

#[test]
fn test_concurrent_load_same_name_different_paths() {
    const THREADS: usize = 6;

    let (loader, backend) = loader_with(ReloadStrategy::Atomic);
    for i in 0..THREADS {
        register(&backend, &format!("/x/clone_{i}.so"), create_plain_alpha);
    }
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let loader = Arc::clone(&loader);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                loader.load(format!("/x/clone_{i}.so"))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.kind() == ErrorKind::DuplicateName))
            .count(),
        THREADS - 1
    );
    assert_eq!(backend.total_open_handles(), 1);
}

#[test]
fn test_load_all_continues_past_failures() {
    let (loader, backend) = loader_with(ReloadStrategy::Atomic);
    register(&backend, "/x/alpha.so", create_alpha);
    register(&backend, "/x/beta.so", create_beta);

    let results = loader.load_all(["/x/alpha.so", "/x/missing.so", "/x/beta.so"]);

    assert_eq!(results.len(), 3);
    assert!(results[0].1.is_ok());
    assert_eq!(
        results[1].1.as_ref().unwrap_err().kind(),
        ErrorKind::LoadFailure
    );
    assert!(results[2].1.is_ok());
    assert_eq!(
        loader
            .list_all()
            .into_iter()
            .map(|m| m.name)
            .collect::<Vec<_>>(),
        vec!["Alpha", "Beta"]
    );
}
