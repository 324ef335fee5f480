fn main() {
    if let Err(e) = bsmanager_lib::run() {
        eprintln!("bsmanager: {:#}", e);
        std::process::exit(1);
    }
}
