//! Shell completions.

use std::io;

use clap::CommandFactory;
use clap_complete::{generate, Shell};

use super::Cli;

/// Write completions for `shell` to stdout.
pub fn run(shell: Shell) {
    generate(shell, &mut Cli::command(), "sharekeeper", &mut io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generates_bash_completions() {
        let mut out = Vec::new();
        generate(Shell::Bash, &mut Cli::command(), "sharekeeper", &mut out);
        let script = String::from_utf8(out).unwrap();
        assert!(script.contains("sharekeeper"));
        assert!(script.contains("share"));
    }
}
