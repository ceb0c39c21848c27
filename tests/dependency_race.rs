use jobgraph::{Job, JobManager};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn release_concurrently(threads: usize) {
    let manager = JobManager::new(4).expect("manager");

    for _ in 0..50 {
        let executions = Arc::new(AtomicUsize::new(0));
        let executions_clone = executions.clone();

        let job = Job::new("contended");
        job.initialize(
            &manager,
            move |_| {
                executions_clone.fetch_add(1, Ordering::SeqCst);
            },
            threads as i32,
        );

        let barrier = std::sync::Barrier::new(threads);
        crossbeam::thread::scope(|scope| {
            for _ in 0..threads {
                scope.spawn(|_| {
                    barrier.wait();
                    job.remove_reference();
                });
            }
        })
        .expect("releasing thread panicked");

        job.wait();
        assert_eq!(job.dependency_count(), 0);
        assert_eq!(executions.load(Ordering::SeqCst), 1);
    }

    manager.shutdown().expect("Shutdown failed");
}

#[test]
fn test_two_releasers_execute_once() {
    release_concurrently(2);
}

#[test]
fn test_eight_releasers_execute_once() {
    release_concurrently(8);
}

#[test]
fn test_sixty_four_releasers_execute_once() {
    release_concurrently(64);
}

#[test]
fn test_add_reference_delays_execution() {
    let manager = JobManager::new(2).expect("manager");
    let executions = Arc::new(AtomicUsize::new(0));
    let executions_clone = executions.clone();

    let job = Job::new("extended");
    job.initialize(
        &manager,
        move |_| {
            executions_clone.fetch_add(1, Ordering::SeqCst);
        },
        1,
    );

    // Extend the graph with a late dependency before releasing the first one.
    job.add_reference();
    job.remove_reference();
    std::thread::sleep(std::time::Duration::from_millis(20));
    assert_eq!(executions.load(Ordering::SeqCst), 0);
    assert!(!job.is_finished());

    job.remove_reference();
    job.wait();
    assert_eq!(executions.load(Ordering::SeqCst), 1);
    manager.shutdown().expect("Shutdown failed");
}
