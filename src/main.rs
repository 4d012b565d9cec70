fn main() {
    if let Err(err) = map_label_placer::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
