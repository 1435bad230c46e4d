fn main() {
    certnest::logging::init();
    if let Err(e) = certnest::cli::run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
