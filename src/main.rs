//! gptscript CLI binary entry point.

use std::io::{BufRead, Write};

use clap::Parser;
use futures::StreamExt;
use gptscript::cli::{Cli, Commands, RunFlags};
use gptscript::engine::Gptscript;
use gptscript::run::{Run, RunState};
use gptscript::types::{CallEventType, Frame, ListModelsOptions, ToolDef};
use gptscript::GlobalOptions;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let engine = match Gptscript::new(GlobalOptions::from_env()).await {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Version => engine.version().await.map(|v| println!("{}", v.trim())),
        Commands::Models(args) => engine
            .list_models(ListModelsOptions {
                providers: args.provider,
                ..Default::default()
            })
            .await
            .map(|models| models.iter().for_each(|m| println!("{m}"))),
        Commands::Run(args) => {
            let options = cli.run.options(args.input.unwrap_or_default());
            match engine.run(args.file, options).await {
                Ok(run) => drive(run, &cli.run).await,
                Err(e) => Err(e),
            }
        }
        Commands::Eval(args) => {
            let tool = ToolDef::builder()
                .instructions(args.instructions)
                .chat(cli.run.chat)
                .build();
            let options = cli.run.options(args.input.unwrap_or_default());
            match engine.evaluate(options, &[tool]).await {
                Ok(run) => drive(run, &cli.run).await,
                Err(e) => Err(e),
            }
        }
    };

    engine.close().await;

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Print each turn's output; with `--chat`, read the next turn from stdin.
async fn drive(mut run: Run, flags: &RunFlags) -> gptscript::Result<()> {
    loop {
        if flags.events {
            if let Some(mut events) = run.events() {
                tokio::spawn(async move {
                    while let Some(frame) = events.next().await {
                        print_frame(&frame);
                    }
                });
            }
        }

        let text = run.text().await;
        if text.is_err() {
            let stderr = run.error_output();
            if !stderr.trim().is_empty() {
                eprintln!("{}", stderr.trim_end());
            }
        }
        println!("{}", text?);

        if !flags.chat || run.state() != RunState::Continue {
            return Ok(());
        }

        print!("> ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(());
        }
        run = run.next_chat(line.trim_end()).await?;
    }
}

fn print_frame(frame: &Frame) {
    if let Some(call) = frame.as_call() {
        match call.event_type {
            CallEventType::CallStart => eprintln!("⚡ {} ({})", call.tool.name, call.id),
            CallEventType::CallFinish => eprintln!("  ✅ {}", call.tool.name),
            _ => {}
        }
    }
}
