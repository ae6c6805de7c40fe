use std::process::ExitCode;

fn main() -> ExitCode {
    rotu_cli::run()
}
