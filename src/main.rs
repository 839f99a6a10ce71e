fn main() {
    if let Err(err) = canopy_etl::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
