//! Interactive collaborators: a line selector and a text editor.
//!
//! Both report an aborted session as [`Selection::Cancelled`], which callers
//! treat as "do nothing" rather than as an error.

use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};
use std::time::SystemTime;

use tracing::debug;

use crate::error::{HearthError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection<T> {
    Chosen(T),
    Cancelled,
}

impl<T> Selection<T> {
    pub fn chosen(self) -> Option<T> {
        match self {
            Self::Chosen(v) => Some(v),
            Self::Cancelled => None,
        }
    }
}

pub trait Selector {
    /// `lines` start with their index. Returns the indices the user picked.
    fn select(&mut self, header: &str, lines: &[String], multi: bool) -> Result<Selection<Vec<usize>>>;
}

pub trait Editor {
    /// Returns the edited text, or `Cancelled` when the file was not saved.
    fn edit(&mut self, text: &str) -> Result<Selection<String>>;
}

impl<S: Selector + ?Sized> Selector for &mut S {
    fn select(&mut self, header: &str, lines: &[String], multi: bool) -> Result<Selection<Vec<usize>>> {
        (**self).select(header, lines, multi)
    }
}

impl<E: Editor + ?Sized> Editor for &mut E {
    fn edit(&mut self, text: &str) -> Result<Selection<String>> {
        (**self).edit(text)
    }
}

/// Read the leading index of every output line.
fn parse_indices(output: &str, len: usize) -> Result<Vec<usize>> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(|token| {
            let i: usize = token
                .parse()
                .map_err(|_| HearthError::Collaborator(format!("selector returned '{token}'")))?;
            if i >= len {
                return Err(HearthError::Collaborator(format!("selector returned index {i} of {len}")));
            }
            Ok(i)
        })
        .collect()
}

fn split_command(command: &str) -> Result<(String, Vec<String>)> {
    let mut parts = command.split_whitespace().map(str::to_string);
    let program = parts
        .next()
        .ok_or_else(|| HearthError::Settings("empty collaborator command".to_string()))?;
    Ok((program, parts.collect()))
}

/// Runs an fzf-compatible program with the lines on stdin.
pub struct ProcessSelector {
    pub command: String,
}

impl Selector for ProcessSelector {
    fn select(&mut self, header: &str, lines: &[String], multi: bool) -> Result<Selection<Vec<usize>>> {
        let (program, mut args) = split_command(&self.command)?;
        if !header.is_empty() {
            args.push(format!("--header={header}"));
        }
        if multi {
            args.push("--multi".to_string());
        }

        let mut child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| HearthError::Collaborator(format!("failed to run {program}: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            let input = lines.join("\n") + "\n";
            // The selector may exit before reading everything.
            if let Err(e) = stdin.write_all(input.as_bytes()) {
                if e.kind() != ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
        }

        let output = child.wait_with_output()?;
        match output.status.code() {
            Some(0) => {}
            // 1: no match, 130: aborted
            Some(1) | Some(130) => return Ok(Selection::Cancelled),
            code => {
                return Err(HearthError::Collaborator(format!(
                    "{program} exited with {code:?}"
                )))
            }
        }

        let indices = parse_indices(&String::from_utf8_lossy(&output.stdout), lines.len())?;
        debug!(header, picked = ?indices, "selection made");
        if indices.is_empty() {
            return Ok(Selection::Cancelled);
        }
        Ok(Selection::Chosen(indices))
    }
}

/// Opens the text in an external editor through a temporary file.
pub struct ExternalEditor {
    pub command: String,
}

impl Editor for ExternalEditor {
    fn edit(&mut self, text: &str) -> Result<Selection<String>> {
        let (program, args) = split_command(&self.command)?;
        let mut file = tempfile::Builder::new()
            .prefix("hearth-")
            .suffix(".txt")
            .tempfile()?;
        file.write_all(text.as_bytes())?;
        file.flush()?;

        let modified = |f: &tempfile::NamedTempFile| -> Result<SystemTime> {
            Ok(std::fs::metadata(f.path())?.modified()?)
        };
        let before = modified(&file)?;

        let status = Command::new(&program)
            .args(&args)
            .arg(file.path())
            .status()
            .map_err(|e| HearthError::Collaborator(format!("failed to run {program}: {e}")))?;
        if !status.success() {
            return Err(HearthError::Collaborator(format!("{program} exited with {status}")));
        }

        if modified(&file)? == before {
            return Ok(Selection::Cancelled);
        }
        Ok(Selection::Chosen(std::fs::read_to_string(file.path())?))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_indices_reads_leading_token() {
        assert_eq!(parse_indices(" 3 Food  Cash\n10 x\n", 11).unwrap(), vec![3, 10]);
        assert!(parse_indices("11 x\n", 11).is_err());
        assert!(parse_indices("abc\n", 11).is_err());
        assert!(parse_indices("", 3).unwrap().is_empty());
    }

    #[test]
    fn test_selection_chosen() {
        assert_eq!(Selection::Chosen(2).chosen(), Some(2));
        assert_eq!(Selection::<usize>::Cancelled.chosen(), None);
    }

    #[test]
    fn test_split_command() {
        let (program, args) = split_command("code --wait").unwrap();
        assert_eq!(program, "code");
        assert_eq!(args, vec!["--wait"]);
        assert!(split_command("  ").is_err());
    }

    #[test]
    fn test_editor_that_does_not_save_cancels() {
        let mut editor = ExternalEditor {
            command: "true".to_string(),
        };
        assert_eq!(editor.edit("0 a\n").unwrap(), Selection::Cancelled);
    }

    #[test]
    fn test_selector_abort_is_cancellation() {
        let mut selector = ProcessSelector {
            command: "false".to_string(),
        };
        let lines = vec!["0 a".to_string()];
        assert_eq!(selector.select("", &lines, false).unwrap(), Selection::Cancelled);
    }
}
