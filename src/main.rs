use colored::Colorize;

fn main() {
    if let Err(e) = gantry::run() {
        eprintln!("{} {e:?}", "ERROR:".red());
        std::process::exit(1);
    }
}
