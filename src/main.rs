use jobgraph::{GraphOrchestrator, JobManager, JobManagerConfig, Solver};
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

const GRAVITY: f32 = -9.81;
const PARTICLES_PER_CHUNK: usize = 10_000;

#[derive(Clone, Copy)]
struct Particle {
    position: [f32; 3],
    velocity: [f32; 3],
}

/// Integrates particles under gravity, one chunk of particles per job.
struct ParticleSolver {
    chunks: Vec<Mutex<Vec<Particle>>>,
    active_chunks: AtomicUsize,
    dt: Mutex<f32>,
    steps: AtomicUsize,
}

impl ParticleSolver {
    fn new(num_chunks: usize) -> Self {
        let mut rng = rand::rng();
        let chunks = (0..num_chunks)
            .map(|_| {
                let particles = (0..PARTICLES_PER_CHUNK)
                    .map(|_| Particle {
                        position: [0.0, 100.0, 0.0],
                        velocity: [
                            rng.random_range(-5.0..5.0),
                            rng.random_range(0.0..10.0),
                            rng.random_range(-5.0..5.0),
                        ],
                    })
                    .collect();
                Mutex::new(particles)
            })
            .collect();

        ParticleSolver {
            chunks,
            active_chunks: AtomicUsize::new(num_chunks),
            dt: Mutex::new(0.0),
            steps: AtomicUsize::new(0),
        }
    }

    fn lowest_particle(&self) -> f32 {
        self.chunks
            .iter()
            .flat_map(|chunk| {
                let chunk = chunk.lock().unwrap_or_else(|e| e.into_inner());
                chunk.iter().map(|p| p.position[1]).collect::<Vec<_>>()
            })
            .fold(f32::INFINITY, f32::min)
    }
}

impl Solver for ParticleSolver {
    fn chunk_count(&self) -> usize {
        self.active_chunks.load(Ordering::Acquire)
    }

    fn begin_step(&self, dt: f32) {
        *self.dt.lock().unwrap_or_else(|e| e.into_inner()) = dt;
    }

    fn run_chunk(&self, index: usize) {
        let dt = *self.dt.lock().unwrap_or_else(|e| e.into_inner());
        let mut particles = self.chunks[index].lock().unwrap_or_else(|e| e.into_inner());
        for particle in particles.iter_mut() {
            particle.velocity[1] += GRAVITY * dt;
            for axis in 0..3 {
                particle.position[axis] += particle.velocity[axis] * dt;
            }
        }
    }

    fn end_step(&self) {
        self.steps.fetch_add(1, Ordering::AcqRel);
    }
}

fn main() {
    env_logger::init();
    println!("jobgraph - dependency-counted job scheduler\n");

    let config = JobManagerConfig::default();
    let num_threads = config.num_threads;
    let manager = match JobManager::new_with_config(config) {
        Ok(manager) => manager,
        Err(e) => {
            eprintln!("Failed to start job manager: {}", e);
            std::process::exit(1);
        }
    };
    println!("Initialized job manager with {} worker threads\n", num_threads);

    let max_chunks = 16;
    let solver = Arc::new(ParticleSolver::new(max_chunks));
    let mut orchestrator = GraphOrchestrator::new(solver.clone(), &manager);

    let dt = 1.0 / 60.0;
    let frames = 120;
    let start = Instant::now();

    for frame in 0..frames {
        // Vary the chunk count to exercise graph rebuilds.
        let active = match frame / 40 {
            0 => max_chunks,
            1 => max_chunks / 2,
            _ => max_chunks,
        };
        solver.active_chunks.store(active, Ordering::Release);

        orchestrator.start_simulation(dt);
        if let Err(e) = orchestrator.wait_for_simulation() {
            eprintln!("Frame {} failed: {}", frame, e);
            break;
        }
    }

    let duration = start.elapsed();
    println!(
        "Simulated {} frames ({} solver steps) in {:?}",
        frames,
        solver.steps.load(Ordering::Acquire),
        duration
    );
    println!("Lowest particle height: {:.2}\n", solver.lowest_particle());

    drop(orchestrator);
    println!("Shutting down job manager...");
    match manager.shutdown() {
        Ok(_) => println!("Done!"),
        Err(e) => eprintln!("Shutdown error: {}", e),
    }
}
