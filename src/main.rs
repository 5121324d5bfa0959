fn main() {
    let result = match std::env::args_os().nth(1) {
        Some(path) => feedback_particles::core::Engine::run_with_file(path),
        None => feedback_particles::core::Engine::run(),
    };
    if let Err(e) = result {
        eprintln!("Engine failed: {}", e);
        std::process::exit(1);
    }
}
