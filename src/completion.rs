//! # Shell Completion Module
//!
//! Completion scripts through `clap_complete`, plus dynamic completion of
//! track ids from the signal database.
//!
//! ## Usage
//!
//! ```bash
//! # Generate bash completions
//! museq completion bash > ~/.local/share/bash-completion/completions/museq
//!
//! # Generate zsh completions
//! museq completion zsh > ~/.config/zsh/completions/_museq
//! ```

use clap::Command;
use clap_complete::{generate, Generator, Shell as CompletionShell};
use std::io;
use std::path::Path;

use museq::db::SqliteSignalStore;

use crate::cli::Shell;

/// Generate shell completions for the given shell
pub fn generate_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

/// Convert our Shell enum to clap_complete's Shell enum
pub fn shell_to_completion_shell(shell: Shell) -> CompletionShell {
    match shell {
        Shell::Bash => CompletionShell::Bash,
        Shell::Zsh => CompletionShell::Zsh,
        Shell::Fish => CompletionShell::Fish,
        Shell::PowerShell => CompletionShell::PowerShell,
        Shell::Elvish => CompletionShell::Elvish,
    }
}

/// Track ids known to the database at `db_path`.
///
/// A missing or unreadable database yields an empty list; completion must
/// never fail loudly.
pub fn get_track_completions(db_path: &Path) -> Vec<String> {
    if !db_path.exists() {
        return Vec::new();
    }

    SqliteSignalStore::open(db_path)
        .and_then(|store| store.known_tracks())
        .unwrap_or_default()
}

/// Print track ids for shell completion, quoting those with whitespace.
pub fn print_track_completions(db_path: &Path) {
    for track in get_track_completions(db_path) {
        if track.contains(' ') || track.contains('\t') {
            println!("\"{}\"", track.replace('"', "\\\""));
        } else {
            println!("{track}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_shell_conversion() {
        assert_eq!(shell_to_completion_shell(Shell::Bash), CompletionShell::Bash);
        assert_eq!(shell_to_completion_shell(Shell::Zsh), CompletionShell::Zsh);
    }

    #[test]
    fn test_track_completions_missing_db() {
        let dir = TempDir::new().unwrap();
        assert!(get_track_completions(&dir.path().join("absent.db")).is_empty());
    }

    #[test]
    fn test_track_completions_from_db() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("signals.db");
        let store = SqliteSignalStore::open(&path).unwrap();
        store.set_favorite("/m/b.flac", true).unwrap();
        store.set_hidden("/m/a.flac", true).unwrap();
        drop(store);

        assert_eq!(get_track_completions(&path), vec!["/m/a.flac", "/m/b.flac"]);
    }
}
