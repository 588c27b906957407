use crate::cli::parser::Commands;
use crate::config::Config;
use crate::errors::AppResult;
use crate::ui::messages::{error, success, warning};
use std::process::Command;

/// Handle the `config` subcommand
pub fn handle(cmd: &Commands, cfg: &Config) -> AppResult<()> {
    let Commands::Config {
        print_config,
        edit_config,
        editor,
    } = cmd
    else {
        return Ok(());
    };

    let path = Config::config_file();

    // ---- PRINT CONFIG ----
    if *print_config {
        // Never echo the gateway password
        let mut shown = cfg.clone();
        if shown.gateway.password.is_some() {
            shown.gateway.password = Some("********".to_string());
        }
        println!("📄 Current configuration ({}):\n", path.display());
        println!("{}", serde_yaml::to_string(&shown)?);
    }

    // ---- EDIT CONFIG ----
    if *edit_config {
        let default_editor = std::env::var("EDITOR")
            .or_else(|_| std::env::var("VISUAL"))
            .unwrap_or_else(|_| {
                if cfg!(target_os = "windows") {
                    "notepad".to_string()
                } else {
                    "nano".to_string()
                }
            });
        let editor_to_use = editor.clone().unwrap_or_else(|| default_editor.clone());

        match Command::new(&editor_to_use).arg(&path).status() {
            Ok(s) if s.success() => {
                success(format!("Configuration edited with '{editor_to_use}'"));
            }
            _ => {
                warning(format!(
                    "Editor '{editor_to_use}' not available, falling back to '{default_editor}'"
                ));
                match Command::new(&default_editor).arg(&path).status() {
                    Ok(s) if s.success() => {
                        success(format!("Configuration edited with '{default_editor}'"));
                    }
                    _ => error(format!(
                        "Failed to edit configuration file with '{default_editor}'"
                    )),
                }
            }
        }
    }

    Ok(())
}
