fn main() {
    env_logger::init();
    deck_forge::cli::run();
}
