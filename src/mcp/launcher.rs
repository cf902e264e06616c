use std::path::Path;

use crate::core::config::Config;
use crate::core::error::SessionError;

/// Command line used to start a tool server from a script path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerLaunch {
    pub command: String,
    pub args: Vec<String>,
}

impl ServerLaunch {
    /// Picks the interpreter from the script extension: `.py` runs under the
    /// configured Python command, `.js` under the configured Node command.
    ///
    /// The configured command may carry leading arguments (`uv run`); they are
    /// placed before the script path.
    pub fn from_script(script: &Path, config: &Config) -> Result<Self, SessionError> {
        let interpreter = match script.extension().and_then(|ext| ext.to_str()) {
            Some("py") => &config.python_command,
            Some("js") => &config.node_command,
            _ => {
                return Err(SessionError::Connection(
                    "Server script must be a .py or .js file".to_string(),
                ))
            }
        };

        let mut words = interpreter.split_whitespace().map(str::to_string);
        let Some(command) = words.next() else {
            return Err(SessionError::Connection(format!(
                "No interpreter configured for {}",
                script.display()
            )));
        };
        let mut args: Vec<String> = words.collect();
        args.push(script.to_string_lossy().into_owned());

        Ok(Self { command, args })
    }

    pub fn describe(&self) -> String {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn python_and_node_scripts_use_configured_commands() {
        let config = Config {
            python_command: "python3".to_string(),
            ..Config::default()
        };

        let py = ServerLaunch::from_script(Path::new("servers/weather.py"), &config).unwrap();
        assert_eq!(py.command, "python3");
        assert_eq!(py.args, vec!["servers/weather.py".to_string()]);

        let js = ServerLaunch::from_script(Path::new("weather.js"), &config).unwrap();
        assert_eq!(js.describe(), "node weather.js");
    }

    #[test]
    fn interpreter_arguments_precede_script() {
        let config = Config {
            python_command: "uv run".to_string(),
            node_command: "  node   --enable-source-maps ".to_string(),
            ..Config::default()
        };

        let py = ServerLaunch::from_script(Path::new("x.py"), &config).unwrap();
        assert_eq!(py.command, "uv");
        assert_eq!(py.args, vec!["run".to_string(), "x.py".to_string()]);

        let js = ServerLaunch::from_script(Path::new("srv/x.js"), &config).unwrap();
        assert_eq!(js.describe(), "node --enable-source-maps srv/x.js");
    }

    #[test]
    fn blank_interpreter_is_a_connection_error() {
        let config = Config {
            python_command: "   ".to_string(),
            ..Config::default()
        };
        let err = ServerLaunch::from_script(Path::new("x.py"), &config).unwrap_err();
        assert_eq!(err, SessionError::Connection("No interpreter configured for x.py".to_string()));
    }

    #[test]
    fn other_extensions_are_rejected() {
        let config = Config::default();
        for script in ["server.ts", "server", "server.PY.txt"] {
            let err = ServerLaunch::from_script(Path::new(script), &config).unwrap_err();
            assert_eq!(
                err.to_string(),
                "Connection failed: Server script must be a .py or .js file"
            );
        }
    }
}
