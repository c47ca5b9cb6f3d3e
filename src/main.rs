fn main() -> std::process::ExitCode {
    ukk_grader::run()
}
