fn main() {
    if let Err(err) = rebel::cli::run() {
        if rebel::exit::exit_code(&err) == rebel::exit::ExitCode::Cancelled.as_i32() {
            eprintln!("{err}");
        } else {
            rebel::ui::eprintln_error(&err);
        }
        std::process::exit(rebel::exit::exit_code(&err));
    }
}
