use jobgraph::tracing::{export_to_file, take_events};
use jobgraph::{Job, JobManager, JobManagerConfig};

#[test]
fn test_job_spans_are_exported() {
    let manager = JobManager::new_with_config(JobManagerConfig {
        num_threads: 2,
        record_trace: true,
        ..JobManagerConfig::default()
    })
    .expect("manager");

    let jobs: Vec<_> = (0..10)
        .map(|_| {
            let job = Job::new("traced_job");
            job.initialize(&manager, |_| std::thread::yield_now(), 1);
            job.remove_reference();
            job
        })
        .collect();
    for job in &jobs {
        job.wait();
    }

    // Buffers are flushed when the workers exit.
    manager.shutdown().expect("Shutdown failed");

    let path = std::env::temp_dir().join(format!("jobgraph-trace-{}.json", std::process::id()));
    export_to_file(&path).expect("export trace");
    let exported: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).expect("read trace")).expect("valid json");
    let _ = std::fs::remove_file(&path);

    let traced = exported
        .as_array()
        .expect("trace is a json array")
        .iter()
        .filter(|event| event["name"] == "traced_job")
        .count();
    assert_eq!(traced, 10);

    let events = take_events();
    assert_eq!(events.iter().filter(|e| e.name == "traced_job").count(), 10);
}
