// src/files.rs
use std::fs::{self, File};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use log::info;

use crate::drivers::DaqError;

/// Invalid answers tolerated before giving up.
const MAX_ATTEMPTS: usize = 2;

/// Prints `message` and reads one trimmed line of operator input.
pub(crate) fn ask<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    message: &str,
) -> Result<String, DaqError> {
    write!(output, "{message}")?;
    output.flush()?;
    let mut answer = String::new();
    input.read_line(&mut answer)?;
    Ok(answer.trim().to_string())
}

/// Creates an empty target file. When the file already exists the operator
/// chooses between deleting it (`D`) and aborting to pick another name (`N`).
pub fn prepare_target_file<R: BufRead, W: Write>(
    path: &Path,
    input: &mut R,
    output: &mut W,
) -> Result<PathBuf, DaqError> {
    let mut attempts = 0;
    loop {
        if attempts >= MAX_ATTEMPTS {
            writeln!(output, "Maximum number of attempts reached. Exiting program.")?;
            return Err(DaqError::TooManyAttempts);
        }
        if !path.exists() {
            File::create(path)?;
            info!("created {}", path.display());
            return Ok(path.to_path_buf());
        }
        let choice = ask(
            input,
            output,
            &format!(
                "The file '{}' already exists. Delete it (D) or specify a new location and name (N)? Enter 'D' or 'N': ",
                path.display()
            ),
        )?
        .to_ascii_uppercase();
        match choice.as_str() {
            "D" => {
                fs::remove_file(path)?;
                info!("deleted existing {}", path.display());
            }
            "N" => {
                writeln!(output, "Please restart and provide a valid file_path & file_name")?;
                return Err(DaqError::FileExists(path.display().to_string()));
            }
            _ => {
                writeln!(output, "Invalid input. Please enter 'D' or 'N'.")?;
                attempts += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn temp_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("labdaq_files_{}_{}.txt", tag, std::process::id()))
    }

    #[test]
    fn creates_missing_file_without_prompting() {
        let path = temp_path("missing");
        fs::remove_file(&path).ok();
        let mut out = Vec::new();
        let created = prepare_target_file(&path, &mut Cursor::new(""), &mut out).unwrap();
        assert!(created.exists());
        assert!(out.is_empty());
        fs::remove_file(&path).ok();
    }
    #[test]
    fn delete_answer_recreates_empty_file() {
        let path = temp_path("delete");
        fs::write(&path, "old data").unwrap();
        let mut out = Vec::new();
        prepare_target_file(&path, &mut Cursor::new("d\n"), &mut out).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
        fs::remove_file(&path).ok();
    }
    #[test]
    fn new_answer_aborts_and_keeps_file() {
        let path = temp_path("new");
        fs::write(&path, "keep").unwrap();
        let mut out = Vec::new();
        let err = prepare_target_file(&path, &mut Cursor::new("N\n"), &mut out).unwrap_err();
        assert!(matches!(err, DaqError::FileExists(_)));
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep");
        fs::remove_file(&path).ok();
    }
    #[test]
    fn gives_up_after_two_invalid_answers() {
        let path = temp_path("invalid");
        fs::write(&path, "keep").unwrap();
        let mut out = Vec::new();
        let err = prepare_target_file(&path, &mut Cursor::new("x\ny\nD\n"), &mut out).unwrap_err();
        assert!(matches!(err, DaqError::TooManyAttempts));
        assert!(path.exists());
        let printed = String::from_utf8(out).unwrap();
        assert_eq!(printed.matches("Invalid input").count(), 2);
        fs::remove_file(&path).ok();
    }
    #[test]
    fn one_invalid_answer_then_delete_succeeds() {
        let path = temp_path("retry");
        fs::write(&path, "old").unwrap();
        let mut out = Vec::new();
        prepare_target_file(&path, &mut Cursor::new("?\nD\n"), &mut out).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
        fs::remove_file(&path).ok();
    }
}
