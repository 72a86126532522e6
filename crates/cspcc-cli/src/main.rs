use std::{env, process::ExitCode, str::FromStr, time::Instant};

use cspcc::{CompOpts, Subtarget, compile_file};

const USAGE: &str = "\
usage: cspcc [options] <file.gpp>
  -o, --output <file>        write the C output here
      --subtarget <name>     code-generation subtarget (default, ev3)
      --trace-compops <ops>  comma-separated compops to trace
      --trace-langops <ops>  comma-separated langops to trace
      --stop-after <pass>    stop the pipeline after the named pass
      --sfi-calls <file>     function-calls listing for stack sizing
      --sfi-usage <file>     gcc stack-usage report for stack sizing
      --dump-tree            dump the tree after each pass
      --digest               record a digest of the emitted bytes
      --lenient-eof          treat unexpected end-of-file as a warning
  -h, --help                 show this help
  -V, --version              show the version";

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut opts = CompOpts::default();
    let mut input: Option<String> = None;
    let mut output: Option<String> = None;

    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "-h" | "--help" => {
                println!("{USAGE}");
                return ExitCode::SUCCESS;
            }
            "-V" | "--version" => {
                println!("cspcc {}", env!("CARGO_PKG_VERSION"));
                return ExitCode::SUCCESS;
            }
            "-o" | "--output" => match it.next() {
                Some(path) => output = Some(path),
                None => return missing_value(&arg),
            },
            "--subtarget" => match it.next() {
                Some(name) => match Subtarget::from_str(&name) {
                    Ok(st) => opts.subtarget = st,
                    Err(_) => {
                        eprintln!("error: unknown subtarget [{name}]");
                        return ExitCode::FAILURE;
                    }
                },
                None => return missing_value(&arg),
            },
            "--trace-compops" => match it.next() {
                Some(list) => opts.trace_compops.extend(list.split(',').map(str::to_owned)),
                None => return missing_value(&arg),
            },
            "--trace-langops" => match it.next() {
                Some(list) => opts.trace_langops.extend(list.split(',').map(str::to_owned)),
                None => return missing_value(&arg),
            },
            "--stop-after" => match it.next() {
                Some(pass) => opts.stop_after = Some(pass),
                None => return missing_value(&arg),
            },
            "--sfi-calls" => match it.next() {
                Some(path) => opts.sfi_calls_file = Some(path),
                None => return missing_value(&arg),
            },
            "--sfi-usage" => match it.next() {
                Some(path) => opts.sfi_usage_file = Some(path),
                None => return missing_value(&arg),
            },
            "--dump-tree" => opts.dump_tree = true,
            "--digest" => opts.codegen_digest = true,
            "--lenient-eof" => opts.lenient_eof = true,
            other if other.starts_with('-') => {
                eprintln!("error: unknown option [{other}]\n{USAGE}");
                return ExitCode::FAILURE;
            }
            other => {
                if input.replace(other.to_owned()).is_some() {
                    eprintln!("error: more than one input file\n{USAGE}");
                    return ExitCode::FAILURE;
                }
            }
        }
    }

    let Some(input) = input else {
        eprintln!("error: no input file\n{USAGE}");
        return ExitCode::FAILURE;
    };

    let start = Instant::now();
    match compile_file(&input, output.as_deref(), opts) {
        Ok(diagnostics) => {
            if !diagnostics.is_empty() {
                eprint!("{diagnostics}");
            }
            let elapsed = start.elapsed();
            eprintln!("compiled {input} in {elapsed:?}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn missing_value(flag: &str) -> ExitCode {
    eprintln!("error: [{flag}] needs a value\n{USAGE}");
    ExitCode::FAILURE
}
