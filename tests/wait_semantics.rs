use jobgraph::{Job, JobManager};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Builds a job whose payload sets `done` right before returning.
fn flagged_job(manager: &JobManager, delay: Duration) -> (Arc<Job>, Arc<AtomicBool>) {
    let done = Arc::new(AtomicBool::new(false));
    let done_clone = done.clone();
    let job = Job::new("flagged");
    job.initialize(
        manager,
        move |_| {
            thread::sleep(delay);
            done_clone.store(true, Ordering::SeqCst);
        },
        1,
    );
    (job, done)
}

#[test]
fn test_wait_before_submission() {
    let manager = JobManager::new(2).expect("manager");
    let (job, done) = flagged_job(&manager, Duration::ZERO);

    let waiter = {
        let job = job.clone();
        let done = done.clone();
        thread::spawn(move || {
            job.wait();
            done.load(Ordering::SeqCst)
        })
    };

    thread::sleep(Duration::from_millis(20));
    assert!(!job.is_finished());
    job.remove_reference();

    assert!(waiter.join().expect("waiter panicked"));
    manager.shutdown().expect("Shutdown failed");
}

#[test]
fn test_wait_during_execution() {
    let manager = JobManager::new(2).expect("manager");
    let (job, done) = flagged_job(&manager, Duration::from_millis(50));

    job.remove_reference();
    thread::sleep(Duration::from_millis(5));
    job.wait();

    assert!(done.load(Ordering::SeqCst));
    assert!(job.is_finished());
    manager.shutdown().expect("Shutdown failed");
}

#[test]
fn test_wait_after_finish() {
    let manager = JobManager::new(1).expect("manager");
    let (job, done) = flagged_job(&manager, Duration::ZERO);

    job.remove_reference();
    job.wait();
    // A second wait on a finished job returns without blocking.
    job.wait();

    assert!(done.load(Ordering::SeqCst));
    manager.shutdown().expect("Shutdown failed");
}

#[test]
fn test_many_waiters_all_released() {
    let manager = JobManager::new(2).expect("manager");
    let (job, done) = flagged_job(&manager, Duration::from_millis(20));

    let waiters: Vec<_> = (0..8)
        .map(|_| {
            let job = job.clone();
            let done = done.clone();
            thread::spawn(move || {
                job.wait();
                done.load(Ordering::SeqCst)
            })
        })
        .collect();

    job.remove_reference();
    for waiter in waiters {
        assert!(waiter.join().expect("waiter panicked"));
    }
    manager.shutdown().expect("Shutdown failed");
}
