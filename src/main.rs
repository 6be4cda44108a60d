use std::fs;
use std::io::{self, Read};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use rill::{lexer, parser, sema};

fn main() -> Result<ExitCode> {
    let mut args = std::env::args().skip(1);
    let mut dump_tokens = false;
    let mut dump_ast = false;
    let mut input_path: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dump-tokens" => {
                dump_tokens = true;
            }
            "--dump-ast" => {
                dump_ast = true;
            }
            _ => {
                input_path = Some(arg);
                if args.next().is_some() {
                    bail!("Only one input file is supported");
                }
                break;
            }
        }
    }

    let source = if let Some(path) = input_path {
        fs::read_to_string(&path).with_context(|| format!("Reading {path}"))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Reading stdin")?;
        buffer
    };

    let tokens = lexer::tokenize(&source)?;
    if dump_tokens {
        for token in &tokens {
            println!("{:?}", token.kind);
        }
    }

    let module = parser::parse_tokens(tokens)?;
    if dump_ast {
        println!("{module:#?}");
    }

    let errors = sema::check(&module);
    if errors.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        for error in &errors {
            eprintln!("{error}");
        }
        Ok(ExitCode::FAILURE)
    }
}
