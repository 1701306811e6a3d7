fn main() -> std::process::ExitCode {
    flacdl_lib::run()
}
