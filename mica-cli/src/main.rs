use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use mica_core::{compile, run, Target};

/// Command-line driver for the mica compiler.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Source file to compile.
    input: Option<PathBuf>,

    #[arg(long, help = "Execute the compiled module instead of emitting an artifact")]
    run: bool,

    #[arg(long, help = "Print information about the selected target")]
    target_info: bool,

    #[arg(
        long,
        value_name = "TRIPLE",
        help = "Build for the given target triple (defaults to the host)"
    )]
    target: Option<String>,

    #[arg(
        short,
        long,
        value_name = "PATH",
        help = "Write textual IR to PATH instead of stdout"
    )]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match execute(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn execute(cli: Cli) -> Result<u8> {
    let target = match &cli.target {
        Some(triple) => Target::from_triple(triple),
        None => Target::host(),
    };

    if cli.target_info {
        print_target_info(&target);
        if cli.input.is_none() {
            return Ok(0);
        }
    }

    let Some(input) = &cli.input else {
        bail!("no input file specified");
    };
    let source = fs::read_to_string(input)
        .with_context(|| format!("failed to read input file {}", input.display()))?;

    let artifact = compile(&source, target)
        .with_context(|| format!("failed to compile {}", input.display()))?;
    for diagnostic in &artifact.diagnostics {
        eprintln!("{diagnostic}");
    }

    if cli.run {
        let stdout = io::stdout();
        let result = run(&artifact, stdout.lock()).context("execution failed")?;
        return Ok(match result {
            Some(code) => {
                println!("\nProgram exited with code: {code}");
                code as u8
            }
            None => {
                println!("\nProgram completed successfully.");
                0
            }
        });
    }

    let ir = artifact.ir_text();
    match &cli.output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent).with_context(|| {
                        format!("failed to create directory {}", parent.display())
                    })?;
                }
            }
            fs::write(path, &ir)
                .with_context(|| format!("failed to write output file {}", path.display()))?;
        }
        None => print!("{ir}"),
    }

    Ok(0)
}

fn print_target_info(target: &Target) {
    println!("Target Information:");
    println!("  Name: {}", target.name());
    println!("  Triple: {}", target.to_triple_string());
    println!("  Pointer size: {} bytes", target.pointer_size());
    println!("  Libc: {}", target.libc_name());
    println!("  Requires PIC: {}", if target.requires_pic() { "yes" } else { "no" });
    println!("  Requires PIE: {}", if target.requires_pie() { "yes" } else { "no" });
    println!("  Uses C ABI: {}", if target.uses_c_abi() { "yes" } else { "no" });
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn cli(input: Option<PathBuf>) -> Cli {
        Cli {
            input,
            run: false,
            target_info: false,
            target: None,
            output: None,
        }
    }

    #[test]
    fn compiles_to_an_ir_file() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("main.mica");
        fs::write(&input, "fn main() -> u32 { return 0; }").expect("write input");
        let output = dir.path().join("out").join("main.ll");

        let code = execute(Cli {
            output: Some(output.clone()),
            target: Some("x86_64-unknown-linux-gnu".to_string()),
            ..cli(Some(input))
        })
        .expect("cli should succeed");
        assert_eq!(code, 0);

        let ir = fs::read_to_string(&output).expect("read ir");
        assert!(ir.contains("define i32 @main"));
        assert!(ir.contains("target triple = \"x86_64-unknown-linux-gnu\""));
    }

    #[test]
    fn run_mode_propagates_the_exit_value() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("main.mica");
        fs::write(
            &input,
            "fn add(a: u32, b: u32) -> u32 { return a + b; } \
             fn main() -> u32 { return add(2, 3); }",
        )
        .expect("write input");

        let code = execute(Cli {
            run: true,
            ..cli(Some(input))
        })
        .expect("cli should succeed");
        assert_eq!(code, 5);
    }

    #[test]
    fn target_info_needs_no_input() {
        let code = execute(Cli {
            target_info: true,
            target: Some("aarch64-apple-darwin".to_string()),
            ..cli(None)
        })
        .expect("cli should succeed");
        assert_eq!(code, 0);
    }

    #[test]
    fn missing_input_is_an_error() {
        let err = execute(cli(None)).expect_err("cli should fail");
        assert!(err.to_string().contains("no input file"));
    }

    #[test]
    fn missing_file_reports_io_context() {
        let err = execute(cli(Some(PathBuf::from("./does/not/exist.mica"))))
            .expect_err("cli should fail");
        assert!(err.to_string().contains("failed to read input file"));
    }

    #[test]
    fn compile_errors_carry_file_context() {
        let dir = tempdir().expect("tempdir");
        let input = dir.path().join("bad.mica");
        fs::write(&input, "fn main() { break; }").expect("write input");

        let err = execute(cli(Some(input))).expect_err("cli should fail");
        let chain = format!("{err:#}");
        assert!(chain.contains("failed to compile"));
        assert!(chain.contains("break statement not inside a loop"));
    }
}
