//! Shell completion generation for affiliate-export
//!
//! Scripts for bash, zsh, fish and PowerShell. Bash and fish also complete
//! `-d/--datasource` with the ids from the configuration file.

use clap::CommandFactory;
use clap_complete::{Shell, generate};

use crate::cli::CliArgs;
use crate::error::{ConfigError, Result};

const BIN: &str = "affiliate-export";

/// Print the completion script for `shell_name` to stdout
pub fn generate_completion(shell_name: &str) -> Result<()> {
    print!("{}", completion_script(parse_shell(shell_name)?));
    Ok(())
}

/// Parse shell name string to Shell enum
fn parse_shell(shell_name: &str) -> Result<Shell> {
    match shell_name.to_lowercase().as_str() {
        "bash" => Ok(Shell::Bash),
        "zsh" => Ok(Shell::Zsh),
        "fish" => Ok(Shell::Fish),
        "powershell" | "pwsh" => Ok(Shell::PowerShell),
        _ => Err(ConfigError::InvalidValue {
            field: "shell".into(),
            value: format!("{shell_name} (supported: bash, zsh, fish, powershell)"),
        }
        .into()),
    }
}

fn completion_script(shell: Shell) -> String {
    let mut cmd = CliArgs::command();
    let mut buffer = Vec::new();
    generate(shell, &mut cmd, BIN, &mut buffer);
    let base = String::from_utf8_lossy(&buffer).into_owned();

    match shell {
        Shell::Bash => format!(
            r#"{base}
_affiliate_export_datasources() {{
    {BIN} config --list-datasources 2>/dev/null
}}

_affiliate_export_enhanced() {{
    local cur="${{COMP_WORDS[COMP_CWORD]}}"
    local prev="${{COMP_WORDS[COMP_CWORD-1]}}"
    if [[ "$prev" == "-d" || "$prev" == "--datasource" ]]; then
        COMPREPLY=($(compgen -W "$(_affiliate_export_datasources)" -- "$cur"))
        return 0
    fi
    _affiliate-export "$@"
}}

complete -F _affiliate_export_enhanced {BIN}
"#
        ),
        Shell::Fish => format!(
            r#"{base}
complete -c {BIN} -s d -l datasource -f -a "({BIN} config --list-datasources 2>/dev/null)" -d "Datasource name from config file"
"#
        ),
        _ => base,
    }
}
