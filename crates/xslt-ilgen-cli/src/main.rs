fn main() {
    if let Err(error) = xslt_ilgen_cli::run() {
        // The subscriber is installed by run() right after argument parsing.
        tracing::error!(%error, "compilation failed");
        std::process::exit(1);
    }
}
