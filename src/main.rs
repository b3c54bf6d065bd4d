fn main() {
    recon_harness::cli::run();
}
