use clap::Clap;
use shellspawn::{CapturedOutput, InputBinding, OutputBinding, OwnedStdioHandle};
use std::os::raw::c_int;

#[derive(Clap, Debug)]
#[clap(about = "Spawn a command with stdin/stdout/stderr routed per flags")]
struct ExecOpt {
    /// Full command string (program plus arguments, quoted spans kept verbatim)
    #[clap(name = "command")]
    command: String,

    /// Read stdin from this file as one buffer, instead of discarding it
    #[clap(long = "stdin-file")]
    stdin_file: Option<String>,

    /// Write this literal line to stdin, followed by `\n`. May be repeated.
    #[clap(short = 'i', long = "stdin-line")]
    stdin_lines: Vec<String>,

    /// Capture stdout into one buffer and print it once the child exits
    #[clap(long)]
    stdout_buffer: bool,

    /// Capture stdout as an ordered sequence of lines and print each once the child exits
    #[clap(long)]
    stdout_lines: bool,

    /// Capture stderr into one buffer and print it once the child exits
    #[clap(long)]
    stderr_buffer: bool,

    /// Capture stderr as an ordered sequence of lines and print each once the child exits
    #[clap(long)]
    stderr_lines: bool,

    /// Print the parsed options before spawning
    #[clap(long)]
    dump_argv: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let options: ExecOpt = Clap::parse();
    if options.dump_argv {
        println!("{:#?}", options);
    }

    let stdin = build_stdin(&options);
    let stdout = build_output(options.stdout_buffer, options.stdout_lines, libc::STDOUT_FILENO);
    let stderr = build_output(options.stderr_buffer, options.stderr_lines, libc::STDERR_FILENO);

    let outcome = shellspawn::spawn(options.command, stdin, stdout, stderr);

    if !outcome.is_ok() {
        eprintln!(
            "shellspawn: {}",
            outcome.error_text.as_deref().unwrap_or("spawn failed")
        );
        std::process::exit(1);
    }

    print_captured(outcome.stdout);
    print_captured(outcome.stderr);

    println!(
        "---> child process exited with code {:?} <---",
        outcome.child_exit_code
    );
    std::process::exit(outcome.child_exit_code.unwrap_or(1));
}

fn build_stdin(options: &ExecOpt) -> InputBinding {
    if let Some(path) = &options.stdin_file {
        match std::fs::read(path) {
            Ok(bytes) => return InputBinding::Buffer(bytes),
            Err(err) => {
                eprintln!("shellspawn: failed to read {}: {}", path, err);
                std::process::exit(1);
            }
        }
    }
    if !options.stdin_lines.is_empty() {
        return InputBinding::Lines(options.stdin_lines.clone());
    }
    InputBinding::Discard
}

/// When neither capture flag is set, the stream is inherited verbatim by
/// duplicating the CLI's own fd -- the same trick minion-cli used to hand
/// its own stdio straight through to the sandboxed child.
fn build_output(buffer: bool, lines: bool, inherited_fd: c_int) -> OutputBinding {
    if buffer {
        return OutputBinding::Buffer;
    }
    if lines {
        return OutputBinding::Lines;
    }
    let dup = unsafe { libc::dup(inherited_fd) };
    OutputBinding::Handle(OwnedStdioHandle::from_raw_fd(dup))
}

fn print_captured(captured: CapturedOutput) {
    match captured {
        CapturedOutput::None => {}
        CapturedOutput::Buffer(bytes) => {
            use std::io::Write;
            let _ = std::io::stdout().write_all(&bytes);
        }
        CapturedOutput::Lines(lines) => {
            for line in lines {
                println!("{}", line);
            }
        }
    }
}
