fn main() {
    std::process::exit(prism_lib::run())
}
