// Platform integration: reveal paths in the OS file manager and run the
// native directory-picker dialog.

use std::path::Path;

use pget_core::types::PgetError;

/// Reveal `path` in the platform file manager. Files are selected inside
/// their containing folder where the platform supports it.
///
/// The path must exist; it is absolutized and cleaned first.
pub fn open_in_file_manager(path: &str) -> Result<(), PgetError> {
    if path.is_empty() {
        return Err(PgetError::EmptyPath);
    }

    // canonicalize absolutizes, cleans, and verifies existence in one go
    let resolved =
        std::fs::canonicalize(path).map_err(|_| PgetError::NotFound(path.to_string()))?;
    let is_file = resolved.is_file();

    reveal_command(&resolved, is_file).spawn()?;
    Ok(())
}

fn reveal_command(path: &Path, is_file: bool) -> std::process::Command {
    if cfg!(target_os = "macos") {
        let mut cmd = std::process::Command::new("open");
        if is_file {
            // -R reveals the file in Finder instead of opening it
            cmd.arg("-R");
        }
        cmd.arg(path);
        cmd
    } else if cfg!(target_os = "windows") {
        let mut cmd = std::process::Command::new("explorer");
        if is_file {
            cmd.arg(format!("/select,{}", path.display()));
        } else {
            cmd.arg(path);
        }
        cmd
    } else {
        // xdg-open cannot select a file; open its containing directory
        let mut cmd = std::process::Command::new("xdg-open");
        let target = if is_file {
            path.parent().unwrap_or(path)
        } else {
            path
        };
        cmd.arg(target);
        cmd
    }
}

/// Run the platform directory-picker dialog. `Ok(None)` means the user
/// cancelled; the dialog tools exit non-zero in that case.
pub async fn choose_directory() -> Result<Option<String>, PgetError> {
    let output = picker_command().output().await?;
    if !output.status.success() {
        return Ok(None);
    }

    let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if path.is_empty() {
        return Ok(None);
    }
    Ok(Some(path))
}

fn picker_command() -> tokio::process::Command {
    if cfg!(target_os = "macos") {
        let mut cmd = tokio::process::Command::new("osascript");
        cmd.arg("-e")
            .arg(r#"POSIX path of (choose folder with prompt "Choose a download directory")"#);
        cmd
    } else if cfg!(target_os = "windows") {
        let script = concat!(
            "Add-Type -AssemblyName System.Windows.Forms;",
            "$f = New-Object System.Windows.Forms.FolderBrowserDialog;",
            "if($f.ShowDialog() -eq \"OK\"){ Write-Output $f.SelectedPath }",
        );
        let mut cmd = tokio::process::Command::new("powershell");
        cmd.arg("-NoProfile").arg("-Command").arg(script);
        cmd
    } else {
        let mut cmd = tokio::process::Command::new("zenity");
        cmd.arg("--file-selection")
            .arg("--directory")
            .arg("--title=Choose a download directory");
        cmd
    }
}
