use common::build_info;

/// Route panics through `tracing` so they land in the log file too
pub fn register_panic_logger() {
    std::panic::set_hook(Box::new(|panic| {
        let thread = std::thread::current();
        let thread = thread.name().unwrap_or("unnamed");
        match panic.location() {
            Some(loc) => tracing::error!(
                message = %panic,
                thread,
                panic.file = loc.file(),
                panic.line = loc.line(),
            ),
            None => tracing::error!(message = %panic, thread),
        }
    }));
}

pub fn report_build_info() {
    let build = build_info!();

    tracing::debug!(
        profile = build.build_profile,
        features = build.build_features,
        version = build.version,
        repo_version = build.repo_version,
        target = build.build_target.unwrap_or("unknown"),
        "qdv starting up"
    );
}
