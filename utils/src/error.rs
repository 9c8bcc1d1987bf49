use snafu::Snafu;
use std::path::PathBuf;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display(
        "Error running '{}', exit code {}\nstderr:\n{}\nstdout:\n{}",
        hint,
        code,
        stderr,
        stdout
    ))]
    CommandFailed {
        hint: String,
        code: i32,
        stderr: String,
        stdout: String,
    },

    #[snafu(display("Failed to read file at '{}': {}", path.display(), source))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
