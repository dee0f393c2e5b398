/// High-level command line app
mod app;
/// Definition of command-line args
mod args;
/// Chunk scheduling and subprocess execution
mod exec;
/// Filesystem operations
mod fs;
/// Combined command-line and env run settings
mod settings;
/// Text UI
mod ui;

mod invalidate;

// exported for tests:
pub use app::App;
pub use args::Args;
pub use exec::{RunSummary, Scheduler, StopHandle};
pub use fs::{Fs, StatusStore};
pub use settings::Settings;
pub use ui::Ui;

/// Run the command-line app.
pub fn run() -> Result<(), anyhow::Error> {
    use clap::Parser;
    let args = Args::parse();

    // INTERPRET SETTINGS ///////////////
    let settings: Settings = args.try_into()?;

    let log_level = match settings.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    simple_logging::log_to_stderr(log_level);

    // RUN THE THING /////////////////
    let app = App::new(settings);
    app.run()?;

    Ok(())
}
