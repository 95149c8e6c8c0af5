use log::LevelFilter;

/// External crates only get warnings and errors through.
pub fn init() {
    fern::Dispatch::new()
        .format(|out, message, record| {
            let now = chrono::Local::now();
            out.finish(format_args!(
                "{} {:<5} {} {}",
                now.format("%H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(LevelFilter::Warn)
        .level_for("chorus_server", LevelFilter::Info)
        .chain(std::io::stdout())
        .apply()
        .expect("logging is initialized");
}
