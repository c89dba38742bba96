fn main() {
    #[cfg(feature = "cli")]
    skipdelta::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("skipdelta: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
