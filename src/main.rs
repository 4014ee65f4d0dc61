//! upkeep binary entry point.

fn main() {
    if let Err(err) = upkeep::cli::run() {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}
