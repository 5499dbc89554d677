//! CLI entry point for gptscript.

use clap::{Args, Parser, Subcommand};

use crate::types::Options;

/// Drive the gptscript engine from the command line
#[derive(Parser, Debug)]
#[command(name = "gptscript", version, about = "Run gptscript tools through the SDK server")]
pub struct Cli {
    #[command(flatten)]
    pub run: RunFlags,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flags shared by `run` and `eval`.
#[derive(Args, Debug, Clone, Default)]
pub struct RunFlags {
    /// Skip the engine's cache
    #[arg(long, global = true)]
    pub disable_cache: bool,

    /// Print call frames to stderr as they arrive
    #[arg(long, global = true)]
    pub events: bool,

    /// Keep the conversation going, reading each next turn from stdin
    #[arg(long, global = true)]
    pub chat: bool,

    /// Default model for tools that do not name one
    #[arg(long, global = true)]
    pub default_model: Option<String>,
}

impl RunFlags {
    /// Per-run options for these flags.
    pub fn options(&self, input: impl Into<String>) -> Options {
        let mut options = Options::builder()
            .disable_cache(self.disable_cache)
            .include_events(self.events)
            .input(input)
            .build();
        if let Some(model) = &self.default_model {
            options.global.default_model = model.clone();
        }
        options
    }
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a script file
    Run(RunArgs),
    /// Evaluate inline instructions as a chat tool
    Eval(EvalArgs),
    /// Print the engine version
    Version,
    /// List available models
    Models(ModelsArgs),
}

/// Arguments for `gptscript run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Script file or URL
    pub file: String,

    /// Input for the first turn
    pub input: Option<String>,
}

/// Arguments for `gptscript eval`.
#[derive(Parser, Debug)]
pub struct EvalArgs {
    /// Tool instructions
    pub instructions: String,

    /// Input for the first turn
    #[arg(short, long)]
    pub input: Option<String>,
}

/// Arguments for `gptscript models`.
#[derive(Parser, Debug)]
pub struct ModelsArgs {
    /// Model providers to include
    #[arg(short, long)]
    pub provider: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_run_with_input() {
        let cli = Cli::try_parse_from(["gptscript", "run", "hello.gpt", "world"]).unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.file, "hello.gpt");
                assert_eq!(args.input.as_deref(), Some("world"));
            }
            other => panic!("expected Run, got {other:?}"),
        }
        assert!(!cli.run.chat);
    }

    #[test]
    fn flags_after_subcommand_are_global() {
        let cli = Cli::try_parse_from([
            "gptscript",
            "eval",
            "Say hi",
            "--chat",
            "--events",
            "--disable-cache",
            "--default-model",
            "gpt-4o-mini",
        ])
        .unwrap();
        assert!(cli.run.chat);
        assert!(cli.run.events);

        let options = cli.run.options("start");
        assert!(options.disable_cache);
        assert!(options.include_events);
        assert_eq!(options.input, "start");
        assert_eq!(options.global.default_model, "gpt-4o-mini");

        match cli.command {
            Commands::Eval(args) => assert_eq!(args.instructions, "Say hi"),
            other => panic!("expected Eval, got {other:?}"),
        }
    }

    #[test]
    fn parse_models_with_providers() {
        let cli =
            Cli::try_parse_from(["gptscript", "models", "-p", "openai", "-p", "anthropic"]).unwrap();
        match cli.command {
            Commands::Models(args) => assert_eq!(args.provider, vec!["openai", "anthropic"]),
            other => panic!("expected Models, got {other:?}"),
        }
    }

    #[test]
    fn parse_version() {
        let cli = Cli::try_parse_from(["gptscript", "version"]).unwrap();
        assert!(matches!(cli.command, Commands::Version));
    }

    #[test]
    fn parse_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["gptscript"]).is_err());
    }

    #[test]
    fn parse_run_missing_file_is_error() {
        assert!(Cli::try_parse_from(["gptscript", "run"]).is_err());
    }
}
