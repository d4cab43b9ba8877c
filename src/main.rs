use canopy_lang::cli::{self, CliError, EvalOptions, EvalOutcome};
use clap::{Parser as ClapParser, Subcommand};
use std::io::{self, Read};

#[derive(ClapParser)]
#[command(name = "canopy")]
#[command(about = "Canopy - an expression language over lazily-evaluated key-value trees")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate an expression against a JSON document
    Eval {
        /// The expression to evaluate
        expression: String,

        /// JSON input (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<String>,

        /// Pretty-print the output
        #[arg(short, long)]
        pretty: bool,

        /// Only validate syntax, don't evaluate
        #[arg(long)]
        syntax_only: bool,
    },

    /// List the input tree's keys, including formula-derived virtual keys
    Keys {
        /// JSON input (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<String>,
    },
}

// The runtime is single-threaded and cooperative; all suspension happens
// at tree access boundaries.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Eval {
            expression,
            input,
            pretty,
            syntax_only,
        } => run_eval(expression, input, pretty, syntax_only).await,
        Commands::Keys { input } => run_keys(input).await,
    };

    if let Err(e) = result {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn read_input(input: Option<String>) -> Result<Option<String>, CliError> {
    match input {
        Some(s) => Ok(Some(s)),
        None if !atty::is(atty::Stream::Stdin) => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(CliError::Io)?;
            Ok(Some(buffer))
        }
        None => Ok(None),
    }
}

async fn run_eval(
    expression: String,
    input: Option<String>,
    pretty: bool,
    syntax_only: bool,
) -> Result<(), CliError> {
    let input = read_input(input)?;

    let options = EvalOptions {
        expression,
        input,
        pretty,
        syntax_only,
    };

    match cli::execute_eval(&options).await? {
        EvalOutcome::SyntaxValid => println!("Syntax is valid"),
        EvalOutcome::Success(output) => println!("{}", output),
    }
    Ok(())
}

async fn run_keys(input: Option<String>) -> Result<(), CliError> {
    let input = read_input(input)?;
    for key in cli::execute_keys(input.as_deref()).await? {
        println!("{}", key);
    }
    Ok(())
}
