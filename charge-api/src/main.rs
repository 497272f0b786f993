fn main() {
    if let Err(err) = charge_recorder::app::run() {
        eprintln!("api startup failed: {err}");
        std::process::exit(1);
    }
}
