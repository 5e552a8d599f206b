fn main() -> std::process::ExitCode {
    glaucoview_lib::run()
}
